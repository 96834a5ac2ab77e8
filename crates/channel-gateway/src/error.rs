//! Gateway error types.

use channel_session::ChannelError;
use thiserror::Error;

/// Failures on the WebSocket link to the gateway sidecar.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("websocket transport failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// No socket is open to the sidecar.
    #[error("gateway link is not open")]
    NotConnected,

    #[error("malformed gateway frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The gateway took the frame but the channel refused it (NACK).
    #[error("send rejected by channel: {0}")]
    Rejected(String),

    /// No ACK arrived inside the ack window.
    #[error("timed out waiting for delivery ack")]
    AckTimeout,

    #[error("send failed: {0}")]
    Send(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<GatewayError> for ChannelError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(reason) => ChannelError::Rejected(reason),
            GatewayError::AckTimeout => ChannelError::Timeout,
            GatewayError::NotConnected => ChannelError::NotReady,
            GatewayError::Json(e) => ChannelError::Json(e),
            other => ChannelError::Transport(other.to_string()),
        }
    }
}
