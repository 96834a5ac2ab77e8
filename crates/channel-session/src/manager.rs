//! Session lifecycle supervision.
//!
//! The [`ChannelManager`] owns a [`ChannelTransport`] and drives it through
//! the connect / authenticate / ready lifecycle. A single supervisor task
//! opens the transport, pumps its events into the session state machine, and
//! schedules reconnects with exponential backoff when the link drops. Callers
//! never touch the transport directly; every send goes through the manager so
//! the not-ready guard sits in exactly one place.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use notifyd_core::RetryPolicy;

use crate::credentials::CredentialStore;
use crate::state::{
    ConnectionStatus, SessionMachine, SessionMachineInput, SessionState,
};
use crate::transport::{ChannelEvent, ChannelTransport, CloseCause, DocumentPayload};
use crate::{ChannelError, ChannelResult};

/// Tuning knobs for the session supervisor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often `ensure_ready` re-checks the session state.
    pub ready_poll_interval: Duration,
    /// Backoff schedule between reconnect attempts.
    pub reconnect_policy: RetryPolicy,
    /// Reconnects per burst before the supervisor gives up and waits for
    /// the next `initialize` call.
    pub max_reconnect_attempts: u32,
    /// Non-network failures in a row before persisted credentials are
    /// presumed stale and discarded.
    pub credential_reset_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(250),
            reconnect_policy: RetryPolicy::default(),
            max_reconnect_attempts: 10,
            credential_reset_threshold: 10,
        }
    }
}

/// Supervises one messaging channel session.
pub struct ChannelManager {
    config: SessionConfig,
    transport: Arc<dyn ChannelTransport>,
    credentials: Arc<dyn CredentialStore>,
    machine: Mutex<SessionMachine>,
    has_credentials: RwLock<bool>,
    reconnect_attempts: RwLock<u32>,
    consecutive_failures: RwLock<u32>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    pending_challenge: RwLock<Option<String>>,
    supervisor_running: RwLock<bool>,
    stopping: RwLock<bool>,
}

impl ChannelManager {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        credentials: Arc<dyn CredentialStore>,
        config: SessionConfig,
    ) -> Self {
        let has_credentials = match credentials.load() {
            Ok(blob) => blob.is_some(),
            Err(e) => {
                warn!("failed to read persisted channel credentials: {}", e);
                false
            }
        };

        Self {
            config,
            transport,
            credentials,
            machine: Mutex::new(SessionMachine::new()),
            has_credentials: RwLock::new(has_credentials),
            reconnect_attempts: RwLock::new(0),
            consecutive_failures: RwLock::new(0),
            last_connected_at: RwLock::new(None),
            pending_challenge: RwLock::new(None),
            supervisor_running: RwLock::new(false),
            stopping: RwLock::new(false),
        }
    }

    /// Start the supervisor task if it is not already running.
    ///
    /// Safe to call repeatedly; concurrent calls collapse into one task.
    pub async fn initialize(self: &Arc<Self>) {
        {
            let mut running = self.supervisor_running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_supervisor().await;
            *manager.supervisor_running.write().await = false;
        });
    }

    async fn run_supervisor(&self) {
        // Each supervisor run is one reconnect burst; the attempt budget
        // starts fresh. Consecutive failures keep accumulating across
        // bursts until a session actually connects.
        *self.reconnect_attempts.write().await = 0;

        loop {
            if *self.stopping.read().await {
                break;
            }

            self.transition(SessionMachineInput::OpenRequested).await;

            let stored = match self.credentials.load() {
                Ok(blob) => blob,
                Err(e) => {
                    warn!("failed to load channel credentials: {}", e);
                    None
                }
            };
            *self.has_credentials.write().await = stored.is_some();

            // Subscribe before opening so no lifecycle event slips past.
            let mut events = self.transport.events();

            let cause = match self.transport.open(stored).await {
                Ok(()) => self.pump_events(&mut events).await,
                Err(ChannelError::Rejected(detail)) => CloseCause::Rejected(detail),
                Err(ChannelError::Timeout) => CloseCause::Timeout,
                Err(e) => {
                    debug!("transport open failed: {}", e);
                    CloseCause::NetworkLost
                }
            };

            self.transition(SessionMachineInput::ChannelClosed).await;
            *self.pending_challenge.write().await = None;
            info!(cause = ?cause, "channel session closed");

            if *self.stopping.read().await {
                break;
            }

            if cause.is_terminal() {
                info!("channel reported logout, discarding credentials");
                if let Err(e) = self.credentials.clear() {
                    warn!("failed to clear channel credentials: {}", e);
                }
                *self.has_credentials.write().await = false;
                break;
            }

            let attempts = {
                let mut attempts = self.reconnect_attempts.write().await;
                *attempts += 1;
                *attempts
            };
            let failures = {
                let mut failures = self.consecutive_failures.write().await;
                *failures += 1;
                *failures
            };

            if failures > self.config.credential_reset_threshold && !cause.is_network() {
                warn!(
                    failures,
                    "repeated channel failures with credentials, discarding them"
                );
                if let Err(e) = self.credentials.clear() {
                    warn!("failed to clear channel credentials: {}", e);
                }
                *self.has_credentials.write().await = false;
                *self.consecutive_failures.write().await = 0;
            }

            if attempts > self.config.max_reconnect_attempts {
                warn!(
                    attempts,
                    "reconnect attempts exhausted, supervisor going idle"
                );
                break;
            }

            let delay = self.config.reconnect_policy.delay_for_attempt(attempts);
            info!(attempts, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            sleep(delay).await;
        }
    }

    /// Consume transport events until the session closes.
    async fn pump_events(&self, events: &mut broadcast::Receiver<ChannelEvent>) -> CloseCause {
        loop {
            match events.recv().await {
                Ok(ChannelEvent::Challenge(code)) => {
                    if self.state().await == SessionState::Connecting {
                        info!("channel issued a pairing challenge");
                        *self.pending_challenge.write().await = Some(code);
                    }
                }
                Ok(ChannelEvent::Authenticated(credentials)) => {
                    if let Err(e) = self.credentials.save(&credentials) {
                        warn!("failed to persist channel credentials: {}", e);
                    }
                    *self.has_credentials.write().await = true;
                }
                Ok(ChannelEvent::Ready) => {
                    if self.transition(SessionMachineInput::ChannelReady).await {
                        *self.reconnect_attempts.write().await = 0;
                        *self.consecutive_failures.write().await = 0;
                        *self.last_connected_at.write().await = Some(Utc::now());
                        *self.pending_challenge.write().await = None;
                        info!("channel session ready");
                    }
                }
                Ok(ChannelEvent::Closed(cause)) => return cause,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "channel event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return CloseCause::NetworkLost,
            }
        }
    }

    /// Apply one input to the session state machine.
    ///
    /// Returns false when the machine rejects the transition; rejected
    /// inputs are logged and dropped, never escalated.
    async fn transition(&self, input: SessionMachineInput) -> bool {
        let mut machine = self.machine.lock().await;
        match machine.consume(&input) {
            Ok(_) => {
                debug!(state = ?machine.state(), "session state transition");
                true
            }
            Err(_) => {
                debug!(state = ?machine.state(), input = ?input, "ignoring invalid session input");
                false
            }
        }
    }

    pub async fn state(&self) -> SessionState {
        SessionState::from(self.machine.lock().await.state())
    }

    /// Snapshot of the connection for status reporting.
    pub async fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state().await,
            has_credentials: *self.has_credentials.read().await,
            reconnect_attempts: *self.reconnect_attempts.read().await,
            last_connected_at: *self.last_connected_at.read().await,
            pending_challenge: self.pending_challenge.read().await.clone(),
        }
    }

    /// Pairing challenge awaiting a scan, if one is pending.
    pub async fn challenge(&self) -> Option<String> {
        self.pending_challenge.read().await.clone()
    }

    /// Block until the session is ready or `max_wait` elapses.
    ///
    /// Kicks the supervisor if it is idle, then polls. Returns false on
    /// timeout; callers treat that as "not ready", never as an error.
    pub async fn ensure_ready(self: &Arc<Self>, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.state().await.is_connected() && self.transport.is_alive().await {
                return true;
            }
            self.initialize().await;
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.ready_poll_interval).await;
        }
    }

    /// Send a plain text message over the connected session.
    pub async fn send_text(&self, address: &str, body: &str) -> ChannelResult<()> {
        if !self.state().await.is_connected() {
            return Err(ChannelError::NotReady);
        }
        self.transport.send_text(address, body).await
    }

    /// Send a document attachment over the connected session.
    pub async fn send_document(
        &self,
        address: &str,
        document: &DocumentPayload,
    ) -> ChannelResult<()> {
        if !self.state().await.is_connected() {
            return Err(ChannelError::NotReady);
        }
        self.transport.send_document(address, document).await
    }

    /// Stop supervising and close the transport.
    pub async fn shutdown(&self) {
        *self.stopping.write().await = true;
        self.transport.close().await;
        debug!("channel manager shut down");
    }
}
