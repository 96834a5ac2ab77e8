//! Channel error types.

use thiserror::Error;

/// Failures raised by the channel session layer.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The session is not in the Connected state.
    #[error("channel session is not ready")]
    NotReady,

    /// Transport-level failure (socket, gateway process, protocol).
    #[error("channel transport failed: {0}")]
    Transport(String),

    /// The channel acknowledged the request negatively.
    #[error("channel rejected the message: {0}")]
    Rejected(String),

    #[error("channel operation timed out")]
    Timeout,

    /// The credential store could not be read or written.
    #[error("credential store failure: {0}")]
    Credentials(String),

    #[error("malformed session payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
