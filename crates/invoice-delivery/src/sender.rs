//! Single-document delivery with bounded immediate retries.

use std::sync::Arc;
use std::time::Duration;

use channel_session::{ChannelError, ChannelManager, DocumentPayload};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::SendFailure;
use crate::tracker::InvoiceArtifact;

/// Tuning for one document send.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Hard ceiling on each individual attempt.
    pub attempt_timeout: Duration,
    /// Base pause between immediate retries; multiplied by the attempt
    /// number, so 1s, 2s, 3s with the default.
    pub retry_pause: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(12),
            retry_pause: Duration::from_secs(1),
        }
    }
}

/// Pushes one document to one address over the channel session.
///
/// This is the lowest delivery layer: it knows nothing about orders or
/// trackers. Immediate retries here cover blips inside a healthy session;
/// anything longer-lived is the orchestrator's problem.
pub struct DocumentSender {
    channel: Arc<ChannelManager>,
    config: SenderConfig,
}

impl DocumentSender {
    pub fn new(channel: Arc<ChannelManager>, config: SenderConfig) -> Self {
        Self { channel, config }
    }

    /// Send `artifact` with `caption` to `address`.
    ///
    /// Fails fast with [`SendFailure::NotReady`] when the session is not
    /// connected, without consuming any of the retry budget. Otherwise
    /// makes up to `max_immediate_retries` attempts, each bounded by the
    /// configured attempt timeout.
    pub async fn send(
        &self,
        address: &str,
        artifact: &InvoiceArtifact,
        caption: &str,
        max_immediate_retries: u32,
    ) -> Result<(), SendFailure> {
        if !self.channel.state().await.is_connected() {
            return Err(SendFailure::NotReady);
        }

        let document = DocumentPayload {
            filename: artifact.filename.clone(),
            caption: caption.to_string(),
            bytes: artifact.bytes.clone(),
        };

        let budget = max_immediate_retries.max(1);
        let mut last_failure = SendFailure::Timeout { attempts: 0 };

        for attempt in 1..=budget {
            let result = timeout(
                self.config.attempt_timeout,
                self.channel.send_document(address, &document),
            )
            .await;

            match result {
                Ok(Ok(())) => {
                    debug!(
                        address = %address,
                        filename = %document.filename,
                        attempt = attempt,
                        "document sent"
                    );
                    return Ok(());
                }
                Ok(Err(ChannelError::NotReady)) => {
                    // The session dropped mid-send. Immediate retries cannot
                    // help; hand control back to the orchestrator.
                    warn!(address = %address, attempt = attempt, "session lost during send");
                    return Err(SendFailure::NotReady);
                }
                Ok(Err(ChannelError::Timeout)) => {
                    debug!(address = %address, attempt = attempt, "send attempt timed out");
                    last_failure = SendFailure::Timeout { attempts: attempt };
                }
                Ok(Err(error)) => {
                    debug!(address = %address, attempt = attempt, error = %error, "send attempt rejected");
                    last_failure = SendFailure::Rejected {
                        attempts: attempt,
                        detail: error.to_string(),
                    };
                }
                Err(_) => {
                    debug!(address = %address, attempt = attempt, "send attempt hit the local timeout");
                    last_failure = SendFailure::Timeout { attempts: attempt };
                }
            }

            if attempt < budget {
                sleep(self.config.retry_pause * attempt).await;
            }
        }

        warn!(
            address = %address,
            attempts = budget,
            error = %last_failure,
            "document send failed after immediate retries"
        );
        Err(last_failure)
    }
}
