//! WebSocket gateway client.

use crate::{GatewayError, GatewayMessage, GatewayMessageType, GatewayResult};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use channel_session::{
    ChannelError, ChannelEvent, ChannelResult, ChannelTransport, CloseCause, DocumentPayload,
    SessionCredentials,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<GatewayResult<()>>>>>;

/// Gateway client configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway WebSocket URL (e.g., ws://127.0.0.1:8790/session).
    pub url: Url,
    /// How long to wait for the gateway to ack a send.
    pub ack_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            ack_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket client for the channel gateway sidecar.
///
/// One `open` call corresponds to one gateway session. Lifecycle frames are
/// re-broadcast as [`ChannelEvent`]s; SEND_* frames are correlated with
/// their ACK/NACK by id. Exactly one `Closed` event is emitted per session,
/// whatever tears it down.
pub struct GatewayClient {
    config: GatewayConfig,
    event_tx: broadcast::Sender<ChannelEvent>,
    sender: Arc<Mutex<Option<mpsc::Sender<Message>>>>,
    pending: PendingAcks,
    connected: Arc<RwLock<bool>>,
}

impl GatewayClient {
    /// Create a new gateway client with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            config,
            event_tx,
            sender: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(RwLock::new(false)),
        }
    }

    async fn do_open(&self, credentials: Option<SessionCredentials>) -> GatewayResult<()> {
        if *self.connected.read().await {
            debug!("Already connected to gateway");
            return Ok(());
        }

        info!(url = %self.config.url, "Connecting to channel gateway");
        let (ws_stream, _) = connect_async(self.config.url.as_str()).await?;
        let (mut write, read) = ws_stream.split();

        let open_frame = GatewayMessage::open(credentials.map(|c| c.payload));
        write.send(Message::Text(open_frame.to_json()?.into())).await?;
        debug!("Sent OPEN frame");

        let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(100);
        *self.sender.lock().await = Some(msg_tx);
        *self.connected.write().await = true;

        // Writer task: owns the write half until the session ends.
        tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let event_tx = self.event_tx.clone();
        let pending = Arc::clone(&self.pending);
        let sender = Arc::clone(&self.sender);
        let connected = Arc::clone(&self.connected);
        tokio::spawn(async move {
            Self::run_read_loop(read, event_tx, pending, sender, connected).await;
        });

        Ok(())
    }

    /// Process incoming frames until the session ends, then broadcast the
    /// close exactly once.
    async fn run_read_loop(
        mut read: SplitStream<WsStream>,
        event_tx: broadcast::Sender<ChannelEvent>,
        pending: PendingAcks,
        sender: Arc<Mutex<Option<mpsc::Sender<Message>>>>,
        connected: Arc<RwLock<bool>>,
    ) {
        let mut close_cause = None;

        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match GatewayMessage::from_json(&text) {
                    Ok(frame) => {
                        if let Some(cause) = Self::handle_frame(frame, &event_tx, &pending).await {
                            close_cause = Some(cause);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to parse gateway frame");
                    }
                },
                Ok(Message::Ping(data)) => {
                    if let Some(tx) = sender.lock().await.as_ref() {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Gateway closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Gateway WebSocket error");
                    break;
                }
            }
        }

        *connected.write().await = false;
        *sender.lock().await = None;

        // In-flight sends can never be resolved now.
        for (_, ack) in pending.lock().await.drain() {
            let _ = ack.send(Err(GatewayError::NotConnected));
        }

        let cause = close_cause.unwrap_or(CloseCause::NetworkLost);
        let _ = event_tx.send(ChannelEvent::Closed(cause));
    }

    /// Handle one inbound frame. Returns the close cause when the frame
    /// ends the session.
    async fn handle_frame(
        frame: GatewayMessage,
        event_tx: &broadcast::Sender<ChannelEvent>,
        pending: &PendingAcks,
    ) -> Option<CloseCause> {
        match frame.msg_type {
            GatewayMessageType::Challenge => {
                match frame.code {
                    Some(code) => {
                        let _ = event_tx.send(ChannelEvent::Challenge(code));
                    }
                    None => warn!("CHALLENGE frame without a code"),
                }
                None
            }
            GatewayMessageType::Authenticated => {
                match frame.credentials {
                    Some(payload) => {
                        let _ = event_tx
                            .send(ChannelEvent::Authenticated(SessionCredentials::new(payload)));
                    }
                    None => warn!("AUTHENTICATED frame without credentials"),
                }
                None
            }
            GatewayMessageType::Ready => {
                let _ = event_tx.send(ChannelEvent::Ready);
                None
            }
            GatewayMessageType::Ack => {
                if let Some(id) = &frame.id {
                    if let Some(ack) = pending.lock().await.remove(id) {
                        let _ = ack.send(Ok(()));
                    }
                }
                None
            }
            GatewayMessageType::Nack => {
                if let Some(id) = &frame.id {
                    if let Some(ack) = pending.lock().await.remove(id) {
                        let reason = frame
                            .reason
                            .clone()
                            .unwrap_or_else(|| "send rejected".to_string());
                        let _ = ack.send(Err(GatewayError::Rejected(reason)));
                    }
                }
                None
            }
            GatewayMessageType::Closed => Some(Self::close_cause(&frame)),
            _ => {
                debug!(msg_type = ?frame.msg_type, "Ignoring unexpected gateway frame");
                None
            }
        }
    }

    fn close_cause(frame: &GatewayMessage) -> CloseCause {
        match frame.cause.as_deref() {
            Some("LOGGED_OUT") => CloseCause::LoggedOut,
            Some("TIMEOUT") => CloseCause::Timeout,
            Some("REJECTED") => CloseCause::Rejected(
                frame
                    .reason
                    .clone()
                    .unwrap_or_else(|| "rejected by channel".to_string()),
            ),
            _ => CloseCause::NetworkLost,
        }
    }

    /// Send a frame without waiting for an ack.
    async fn send_frame(&self, frame: GatewayMessage) -> GatewayResult<()> {
        let sender = self.sender.lock().await;
        let sender = sender.as_ref().ok_or(GatewayError::NotConnected)?;

        let json = frame.to_json()?;
        sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| GatewayError::Send(e.to_string()))
    }

    /// Send a frame and wait for its ACK/NACK by correlation id.
    async fn send_with_ack(&self, id: &str, frame: GatewayMessage) -> GatewayResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending.lock().await.insert(id.to_string(), ack_tx);

        if let Err(e) = self.send_frame(frame).await {
            self.pending.lock().await.remove(id);
            return Err(e);
        }

        match timeout(self.config.ack_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::NotConnected),
            Err(_) => {
                self.pending.lock().await.remove(id);
                Err(GatewayError::AckTimeout)
            }
        }
    }
}

#[async_trait]
impl ChannelTransport for GatewayClient {
    async fn open(&self, credentials: Option<SessionCredentials>) -> ChannelResult<()> {
        self.do_open(credentials).await.map_err(ChannelError::from)
    }

    async fn close(&self) {
        let sender = self.sender.lock().await.take();
        if let Some(tx) = sender {
            if let Ok(json) = GatewayMessage::close().to_json() {
                let _ = tx.send(Message::Text(json.into())).await;
            }
            let _ = tx.send(Message::Close(None)).await;
        }
        *self.connected.write().await = false;
        debug!("Gateway client closed");
    }

    async fn is_alive(&self) -> bool {
        *self.connected.read().await
    }

    async fn send_text(&self, address: &str, body: &str) -> ChannelResult<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let frame = GatewayMessage::send_text(&id, address, body);
        self.send_with_ack(&id, frame)
            .await
            .map_err(ChannelError::from)
    }

    async fn send_document(&self, address: &str, document: &DocumentPayload) -> ChannelResult<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let data = general_purpose::STANDARD.encode(&document.bytes);
        let frame = GatewayMessage::send_document(
            &id,
            address,
            &document.filename,
            &document.caption,
            &data,
        );
        self.send_with_ack(&id, frame)
            .await
            .map_err(ChannelError::from)
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }
}
