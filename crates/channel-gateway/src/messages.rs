//! Gateway wire protocol messages.

use serde::{Deserialize, Serialize};

/// Gateway frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayMessageType {
    // Daemon to gateway
    Open,
    SendText,
    SendDocument,
    Close,

    // Gateway to daemon
    Challenge,
    Authenticated,
    Ready,
    Ack,
    Nack,
    Closed,
}

/// A frame sent to/from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMessage {
    #[serde(rename = "type")]
    pub msg_type: GatewayMessageType,
    /// Correlation id, echoed back on ACK/NACK.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Base64-encoded document bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Scannable pairing challenge payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Opaque credential blob issued by the channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<serde_json::Value>,
    /// CLOSED cause: LOGGED_OUT, NETWORK, TIMEOUT or REJECTED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// NACK reason or CLOSED detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl GatewayMessage {
    /// Create a new gateway frame.
    pub fn new(msg_type: GatewayMessageType) -> Self {
        Self {
            msg_type,
            id: None,
            to: None,
            body: None,
            filename: None,
            caption: None,
            data: None,
            code: None,
            credentials: None,
            cause: None,
            reason: None,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Create an OPEN frame, resuming with credentials when available.
    pub fn open(credentials: Option<serde_json::Value>) -> Self {
        Self {
            credentials,
            ..Self::new(GatewayMessageType::Open)
        }
    }

    /// Create a SEND_TEXT frame.
    pub fn send_text(id: &str, to: &str, body: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            to: Some(to.to_string()),
            body: Some(body.to_string()),
            ..Self::new(GatewayMessageType::SendText)
        }
    }

    /// Create a SEND_DOCUMENT frame. `data` is base64-encoded.
    pub fn send_document(id: &str, to: &str, filename: &str, caption: &str, data: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            to: Some(to.to_string()),
            filename: Some(filename.to_string()),
            caption: Some(caption.to_string()),
            data: Some(data.to_string()),
            ..Self::new(GatewayMessageType::SendDocument)
        }
    }

    /// Create a CLOSE frame.
    pub fn close() -> Self {
        Self::new(GatewayMessageType::Close)
    }

    /// Set the correlation id.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Set the challenge code.
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    /// Set the credential blob.
    pub fn with_credentials(mut self, credentials: serde_json::Value) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the close cause.
    pub fn with_cause(mut self, cause: &str) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Set the nack reason or close detail.
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Encode the frame as one JSON text message.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a frame out of an incoming text message.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
