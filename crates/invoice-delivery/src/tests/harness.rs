//! Shared fakes and builders for the delivery pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use channel_session::{
    ChannelError, ChannelEvent, ChannelManager, ChannelResult, ChannelTransport, CredentialStore,
    DocumentPayload, SessionConfig, SessionCredentials, SessionState,
};
use notifyd_core::RetryPolicy;

use crate::monitor::{DeliveryMonitor, MonitorConfig};
use crate::ports::{ArtifactArchive, InvoiceRenderer, Order, OrderStore, OrderStoreError, RenderError};
use crate::sender::SenderConfig;
use crate::service::{DeliveryConfig, DeliveryService};
use crate::tracker::InvoiceArtifact;

pub const ADMIN: &str = "admin@c.tavola";
pub const CUSTOMER: &str = "maria@c.tavola";

/// Scripted outcome for one transport send.
#[derive(Debug, Clone)]
pub enum ScriptedSend {
    Ack,
    Nack(&'static str),
    /// Never completes; exercises the per-attempt timeout.
    Hang,
}

impl ScriptedSend {
    async fn apply(&self) -> ChannelResult<()> {
        match self {
            ScriptedSend::Ack => Ok(()),
            ScriptedSend::Nack(detail) => Err(ChannelError::Rejected(detail.to_string())),
            ScriptedSend::Hang => {
                sleep(Duration::from_secs(3600)).await;
                Err(ChannelError::Timeout)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentDocument {
    pub address: String,
    pub filename: String,
    pub caption: String,
    pub size: usize,
}

/// Transport fake that connects on demand and scripts send outcomes.
///
/// While `connectable`, `open` succeeds and immediately emits `Ready`, so
/// the session manager reaches Connected without a handshake dance. Every
/// send is recorded before its scripted outcome is applied.
pub struct FakeTransport {
    events_tx: broadcast::Sender<ChannelEvent>,
    connectable: AtomicBool,
    alive: AtomicBool,
    document_script: StdMutex<VecDeque<ScriptedSend>>,
    document_default: StdMutex<ScriptedSend>,
    text_default: StdMutex<ScriptedSend>,
    sent_documents: StdMutex<Vec<SentDocument>>,
    sent_texts: StdMutex<Vec<(String, String)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(32);
        Arc::new(Self {
            events_tx,
            connectable: AtomicBool::new(false),
            alive: AtomicBool::new(false),
            document_script: StdMutex::new(VecDeque::new()),
            document_default: StdMutex::new(ScriptedSend::Ack),
            text_default: StdMutex::new(ScriptedSend::Ack),
            sent_documents: StdMutex::new(Vec::new()),
            sent_texts: StdMutex::new(Vec::new()),
        })
    }

    pub fn set_connectable(&self, connectable: bool) {
        self.connectable.store(connectable, Ordering::SeqCst);
    }

    /// Queue outcomes for the next document sends, in order. Once the
    /// queue is empty the default outcome applies.
    pub fn script_documents(&self, outcomes: Vec<ScriptedSend>) {
        self.document_script.lock().unwrap().extend(outcomes);
    }

    pub fn set_document_default(&self, outcome: ScriptedSend) {
        *self.document_default.lock().unwrap() = outcome;
    }

    pub fn set_text_default(&self, outcome: ScriptedSend) {
        *self.text_default.lock().unwrap() = outcome;
    }

    pub fn documents(&self) -> Vec<SentDocument> {
        self.sent_documents.lock().unwrap().clone()
    }

    pub fn documents_to(&self, address: &str) -> Vec<SentDocument> {
        self.documents()
            .into_iter()
            .filter(|doc| doc.address == address)
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.sent_documents.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<(String, String)> {
        self.sent_texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for FakeTransport {
    async fn open(&self, _credentials: Option<SessionCredentials>) -> ChannelResult<()> {
        if !self.connectable.load(Ordering::SeqCst) {
            return Err(ChannelError::Transport("gateway unreachable".to_string()));
        }
        self.alive.store(true, Ordering::SeqCst);
        let _ = self.events_tx.send(ChannelEvent::Ready);
        Ok(())
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn send_text(&self, address: &str, body: &str) -> ChannelResult<()> {
        self.sent_texts
            .lock()
            .unwrap()
            .push((address.to_string(), body.to_string()));
        let outcome = self.text_default.lock().unwrap().clone();
        outcome.apply().await
    }

    async fn send_document(&self, address: &str, document: &DocumentPayload) -> ChannelResult<()> {
        self.sent_documents.lock().unwrap().push(SentDocument {
            address: address.to_string(),
            filename: document.filename.clone(),
            caption: document.caption.clone(),
            size: document.bytes.len(),
        });
        let outcome = {
            let mut script = self.document_script.lock().unwrap();
            match script.pop_front() {
                Some(outcome) => outcome,
                None => self.document_default.lock().unwrap().clone(),
            }
        };
        outcome.apply().await
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }
}

pub struct MemoryCredentialStore(StdMutex<Option<SessionCredentials>>);

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self(StdMutex::new(None))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> ChannelResult<Option<SessionCredentials>> {
        Ok(self.0.lock().unwrap().clone())
    }

    fn save(&self, credentials: &SessionCredentials) -> ChannelResult<()> {
        *self.0.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> ChannelResult<()> {
        *self.0.lock().unwrap() = None;
        Ok(())
    }
}

pub struct FakeOrderStore {
    orders: StdMutex<HashMap<String, Order>>,
    outages: StdMutex<VecDeque<String>>,
    fetch_calls: AtomicU32,
}

impl FakeOrderStore {
    pub fn new() -> Self {
        Self {
            orders: StdMutex::new(HashMap::new()),
            outages: StdMutex::new(VecDeque::new()),
            fetch_calls: AtomicU32::new(0),
        }
    }

    pub fn insert(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    /// The next fetch fails as if the application were down.
    pub fn queue_outage(&self, detail: &str) {
        self.outages.lock().unwrap().push_back(detail.to_string());
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for FakeOrderStore {
    async fn fetch(&self, order_id: &str) -> Result<Order, OrderStoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = self.outages.lock().unwrap().pop_front() {
            return Err(OrderStoreError::Unavailable(detail));
        }
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or(OrderStoreError::NotFound)
    }
}

pub struct FakeRenderer {
    failures: StdMutex<VecDeque<String>>,
    render_calls: AtomicU32,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            failures: StdMutex::new(VecDeque::new()),
            render_calls: AtomicU32::new(0),
        }
    }

    /// The next render fails with the given detail.
    pub fn queue_failure(&self, detail: &str) {
        self.failures.lock().unwrap().push_back(detail.to_string());
    }

    pub fn render_calls(&self) -> u32 {
        self.render_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceRenderer for FakeRenderer {
    async fn render(&self, order: &Order) -> Result<InvoiceArtifact, RenderError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = self.failures.lock().unwrap().pop_front() {
            return Err(RenderError(detail));
        }
        Ok(InvoiceArtifact::new(
            format!("invoice-{}.pdf", order.id),
            format!("%PDF-1.7 invoice for {}", order.id).into_bytes(),
        ))
    }
}

/// In-memory archive that records stores instead of touching disk.
pub struct RecordingArchive {
    stored: StdMutex<Vec<(String, String)>>,
}

impl RecordingArchive {
    pub fn new() -> Self {
        Self {
            stored: StdMutex::new(Vec::new()),
        }
    }

    pub fn stored(&self) -> Vec<(String, String)> {
        self.stored.lock().unwrap().clone()
    }
}

impl ArtifactArchive for RecordingArchive {
    fn store(&self, order_id: &str, artifact: &InvoiceArtifact) -> std::io::Result<PathBuf> {
        self.stored
            .lock()
            .unwrap()
            .push((order_id.to_string(), artifact.filename.clone()));
        Ok(PathBuf::from(format!("/archive/{}", artifact.filename)))
    }
}

/// Delivery pipeline wired onto fakes.
pub struct DeliveryHarness {
    pub transport: Arc<FakeTransport>,
    pub channel: Arc<ChannelManager>,
    pub orders: Arc<FakeOrderStore>,
    pub renderer: Arc<FakeRenderer>,
    pub archive: Arc<RecordingArchive>,
    pub service: Arc<DeliveryService>,
}

impl DeliveryHarness {
    pub fn new() -> Self {
        Self::with_config(fast_delivery_config())
    }

    pub fn with_config(config: DeliveryConfig) -> Self {
        let transport = FakeTransport::new();
        let channel = Arc::new(ChannelManager::new(
            Arc::clone(&transport) as Arc<dyn ChannelTransport>,
            Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>,
            fast_session_config(),
        ));
        let orders = Arc::new(FakeOrderStore::new());
        let renderer = Arc::new(FakeRenderer::new());
        let archive = Arc::new(RecordingArchive::new());
        let service = Arc::new(DeliveryService::new(
            Arc::clone(&channel),
            Arc::clone(&orders) as Arc<dyn OrderStore>,
            Arc::clone(&renderer) as Arc<dyn InvoiceRenderer>,
            Some(Arc::clone(&archive) as Arc<dyn ArtifactArchive>),
            ADMIN.to_string(),
            config,
        ));
        Self {
            transport,
            channel,
            orders,
            renderer,
            archive,
            service,
        }
    }

    /// Bring the channel session up and wait until it reports Connected.
    pub async fn connect(&self) {
        self.transport.set_connectable(true);
        self.channel.initialize().await;
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.channel.state().await != SessionState::Connected {
            assert!(Instant::now() < deadline, "channel never connected");
            sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn seed_order(&self, order_id: &str, customer_address: Option<&str>) {
        self.orders.insert(order(order_id, customer_address));
    }

    pub fn monitor(&self, config: MonitorConfig) -> DeliveryMonitor {
        DeliveryMonitor::new(
            Arc::clone(&self.service),
            Arc::clone(&self.channel),
            config,
        )
    }

    /// Poll until the order reports delivered, or panic after 2s.
    pub async fn wait_for_delivered(&self, order_id: &str) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(snapshot) = self.service.delivery_status(order_id).await {
                if snapshot.delivered {
                    return;
                }
            }
            assert!(
                Instant::now() < deadline,
                "order {} was never delivered",
                order_id
            );
            sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn order(order_id: &str, customer_address: Option<&str>) -> Order {
    Order {
        id: order_id.to_string(),
        customer_name: "Maria Rossi".to_string(),
        customer_address: customer_address.map(String::from),
        total_cents: 4250,
        placed_at: Utc::now(),
    }
}

fn fast_session_config() -> SessionConfig {
    SessionConfig {
        ready_poll_interval: Duration::from_millis(5),
        reconnect_policy: RetryPolicy {
            base_delay: Duration::from_millis(5),
            growth: 1.5,
            cap_delay: Duration::from_millis(20),
        },
        max_reconnect_attempts: 10,
        credential_reset_threshold: 10,
    }
}

/// Delivery config with millisecond-scale waits so failing passes resolve
/// quickly. Retry timers still fire within a test run.
pub fn fast_delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        ready_wait: Duration::from_millis(60),
        max_attempts: 10,
        admin_immediate_retries: 3,
        customer_immediate_retries: 2,
        retry_policy: RetryPolicy {
            base_delay: Duration::from_millis(100),
            growth: 1.5,
            cap_delay: Duration::from_millis(400),
        },
        sender: SenderConfig {
            attempt_timeout: Duration::from_millis(200),
            retry_pause: Duration::from_millis(1),
        },
    }
}

/// Delivery config whose retry timers are far beyond the test window, so
/// passes only run when a test calls `deliver` itself.
pub fn manual_pass_config() -> DeliveryConfig {
    DeliveryConfig {
        retry_policy: RetryPolicy {
            base_delay: Duration::from_secs(60),
            growth: 1.5,
            cap_delay: Duration::from_secs(135),
        },
        ..fast_delivery_config()
    }
}

/// Poll a condition until it holds, or give up after 2s.
pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
