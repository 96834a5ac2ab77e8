//! Failure classification for the delivery pipeline.

use std::time::Duration;

use thiserror::Error;

/// Why a delivery pass (or the whole delivery) failed.
///
/// `OrderNotFound` and `ArtifactGeneration` occur before a tracker exists
/// and reject the request outright. The channel-level kinds describe one
/// failed pass and feed the retry scheduler. `MaxAttemptsExceeded` wraps
/// the last per-pass failure once the attempt budget is spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    #[error("order not found in the order store")]
    OrderNotFound,

    #[error("invoice artifact generation failed: {0}")]
    ArtifactGeneration(String),

    #[error("channel connection not ready")]
    ConnectionNotReady,

    #[error("channel send timed out")]
    SendTimeout,

    #[error("channel rejected the message: {0}")]
    ChannelRejected(String),

    #[error("delivery attempts exhausted (last error: {0})")]
    MaxAttemptsExceeded(Box<DeliveryErrorKind>),
}

/// Failure of a single [`DocumentSender::send`](crate::sender::DocumentSender::send)
/// call, after its immediate-retry budget is spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    /// The channel session is not connected. Returned without consuming
    /// any retries.
    #[error("channel session not connected")]
    NotReady,

    #[error("send timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("send rejected after {attempts} attempt(s): {detail}")]
    Rejected { attempts: u32, detail: String },
}

impl From<&SendFailure> for DeliveryErrorKind {
    fn from(failure: &SendFailure) -> Self {
        match failure {
            SendFailure::NotReady => DeliveryErrorKind::ConnectionNotReady,
            SendFailure::Timeout { .. } => DeliveryErrorKind::SendTimeout,
            SendFailure::Rejected { detail, .. } => {
                DeliveryErrorKind::ChannelRejected(detail.clone())
            }
        }
    }
}

/// What one orchestration pass concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The admin notification has been delivered, now or on an earlier pass.
    Delivered,
    /// The pass failed and another one runs after `delay`.
    Retrying {
        reason: DeliveryErrorKind,
        delay: Duration,
    },
    /// The pass failed with no attempts left. The monitor is the only
    /// remaining safety net for this order.
    Exhausted { reason: DeliveryErrorKind },
    /// The request was rejected before any tracker was created.
    Rejected { reason: DeliveryErrorKind },
}

impl PassOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, PassOutcome::Delivered)
    }
}
