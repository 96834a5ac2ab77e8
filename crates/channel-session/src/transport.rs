//! Transport abstraction over the external messaging channel.
//!
//! The session manager drives any `ChannelTransport`; production uses the
//! WebSocket gateway client, tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ChannelResult;

/// Opaque credential blob issued by the channel after authentication.
///
/// The daemon never inspects the payload; it only persists it so the next
/// session can resume without a fresh challenge scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Channel-defined credential material.
    pub payload: serde_json::Value,
    /// When the credentials were issued.
    pub issued_at: DateTime<Utc>,
}

impl SessionCredentials {
    /// Wrap a credential payload, stamping the issue time.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            issued_at: Utc::now(),
        }
    }
}

/// One binary document to push over the channel.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    /// Filename presented to the recipient.
    pub filename: String,
    /// Caption shown alongside the document.
    pub caption: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
}

/// Why a channel session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The account was logged out on the channel side. Terminal.
    LoggedOut,
    /// The underlying connection dropped.
    NetworkLost,
    /// The channel stopped responding.
    Timeout,
    /// The channel refused the session (bad credentials, protocol error).
    Rejected(String),
}

impl CloseCause {
    /// Terminal causes must not trigger a reconnect.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloseCause::LoggedOut)
    }

    /// Network causes never count toward the credential-reset threshold.
    pub fn is_network(&self) -> bool {
        matches!(self, CloseCause::NetworkLost | CloseCause::Timeout)
    }
}

/// Events emitted by a channel transport.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A scannable challenge must be presented out-of-band.
    Challenge(String),
    /// The channel authenticated the session and issued credentials.
    Authenticated(SessionCredentials),
    /// The session is established; sends may proceed.
    Ready,
    /// The session ended.
    Closed(CloseCause),
}

/// A connection to the external messaging channel.
///
/// `open` begins a session; progress and termination arrive on the event
/// stream. Send methods resolve once the channel acknowledges the message.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Begin a session, resuming from credentials when provided.
    async fn open(&self, credentials: Option<SessionCredentials>) -> ChannelResult<()>;

    /// Tear down the current session, if any.
    async fn close(&self);

    /// Cheap liveness probe for an established session.
    async fn is_alive(&self) -> bool;

    /// Send a plain text message to one address.
    async fn send_text(&self, address: &str, body: &str) -> ChannelResult<()>;

    /// Send a document with caption to one address.
    async fn send_document(&self, address: &str, document: &DocumentPayload) -> ChannelResult<()>;

    /// Subscribe to session lifecycle events.
    fn events(&self) -> broadcast::Receiver<ChannelEvent>;
}
