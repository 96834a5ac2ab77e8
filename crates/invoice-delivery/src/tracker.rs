//! Per-order delivery state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rendered invoice document, ready to be pushed over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceArtifact {
    /// Filename presented to recipients.
    pub filename: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
}

impl InvoiceArtifact {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Delivery state for one order.
///
/// Created on the first orchestration pass, after the order has been
/// fetched and the invoice rendered. Mutated only by the orchestrator;
/// the monitor reads snapshots. The three delivered flags are write-once:
/// once set they are never reverted, even by interleaved passes.
#[derive(Debug, Clone)]
pub struct DeliveryTracker {
    pub order_id: String,
    pub customer_address: Option<String>,
    pub admin_address: String,
    pub artifact: InvoiceArtifact,
    /// Orchestration passes charged against this order. Immediate retries
    /// inside a single send do not count.
    pub attempts: u32,
    pub admin_delivered: bool,
    pub customer_delivered: bool,
    /// Overall success, derived from `admin_delivered` at the end of a pass.
    pub delivered: bool,
    /// Stamped once, when the tracker is first created.
    pub created_at: DateTime<Utc>,
    /// True while a retry timer is armed for this order.
    pub retry_scheduled: bool,
    pub last_error: Option<String>,
}

impl DeliveryTracker {
    pub fn new(
        order_id: &str,
        admin_address: &str,
        customer_address: Option<String>,
        artifact: InvoiceArtifact,
    ) -> Self {
        Self {
            order_id: order_id.to_string(),
            customer_address,
            admin_address: admin_address.to_string(),
            artifact,
            attempts: 0,
            admin_delivered: false,
            customer_delivered: false,
            delivered: false,
            created_at: Utc::now(),
            retry_scheduled: false,
            last_error: None,
        }
    }

    /// True when the tracker was created more than `window` ago.
    pub fn older_than(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(self.created_at) > window,
            Err(_) => false,
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot::from(self)
    }
}

/// Read-only view of a tracker, as served to status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub order_id: String,
    pub customer_address: Option<String>,
    pub admin_address: String,
    pub artifact_filename: String,
    pub artifact_size: usize,
    pub attempts: u32,
    pub admin_delivered: bool,
    pub customer_delivered: bool,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub retry_scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TrackerSnapshot {
    /// True when the tracked order was created more than `window` ago.
    pub fn older_than(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(self.created_at) > window,
            Err(_) => false,
        }
    }
}

impl From<&DeliveryTracker> for TrackerSnapshot {
    fn from(tracker: &DeliveryTracker) -> Self {
        Self {
            order_id: tracker.order_id.clone(),
            customer_address: tracker.customer_address.clone(),
            admin_address: tracker.admin_address.clone(),
            artifact_filename: tracker.artifact.filename.clone(),
            artifact_size: tracker.artifact.size(),
            attempts: tracker.attempts,
            admin_delivered: tracker.admin_delivered,
            customer_delivered: tracker.customer_delivered,
            delivered: tracker.delivered,
            created_at: tracker.created_at,
            retry_scheduled: tracker.retry_scheduled,
            last_error: tracker.last_error.clone(),
        }
    }
}

/// Aggregate counts over all live trackers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    pub total: usize,
    pub admin_delivered: usize,
    pub customer_delivered: usize,
    /// Undelivered orders that still have passes left.
    pub pending: usize,
    /// Undelivered orders whose attempt budget is spent.
    pub failed: usize,
}

impl DeliveryStats {
    pub fn tally<'a>(
        trackers: impl IntoIterator<Item = &'a DeliveryTracker>,
        max_attempts: u32,
    ) -> Self {
        let mut stats = Self::default();
        for tracker in trackers {
            stats.total += 1;
            if tracker.admin_delivered {
                stats.admin_delivered += 1;
            }
            if tracker.customer_delivered {
                stats.customer_delivered += 1;
            }
            if !tracker.delivered {
                if tracker.attempts >= max_attempts {
                    stats.failed += 1;
                } else {
                    stats.pending += 1;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(order_id: &str) -> DeliveryTracker {
        DeliveryTracker::new(
            order_id,
            "admin@c.tavola",
            Some("maria@c.tavola".to_string()),
            InvoiceArtifact::new("invoice-1.pdf", vec![0u8; 64]),
        )
    }

    #[test]
    fn test_new_tracker_starts_clean() {
        let tracker = tracker("ord-1");
        assert_eq!(tracker.attempts, 0);
        assert!(!tracker.admin_delivered);
        assert!(!tracker.customer_delivered);
        assert!(!tracker.delivered);
        assert!(!tracker.retry_scheduled);
        assert!(tracker.last_error.is_none());
        let age = Utc::now().signed_duration_since(tracker.created_at);
        assert!(age.num_seconds() < 5);
    }

    #[test]
    fn test_older_than_is_strict() {
        let mut tracker = tracker("ord-1");
        tracker.created_at = Utc::now() - chrono::Duration::seconds(120);

        let now = Utc::now();
        assert!(tracker.older_than(now, Duration::from_secs(60)));
        assert!(!tracker.older_than(now, Duration::from_secs(600)));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut tracker = tracker("ord-1");
        tracker.attempts = 2;
        tracker.admin_delivered = true;

        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json["orderId"], "ord-1");
        assert_eq!(json["customerAddress"], "maria@c.tavola");
        assert_eq!(json["artifactFilename"], "invoice-1.pdf");
        assert_eq!(json["artifactSize"], 64);
        assert_eq!(json["attempts"], 2);
        assert_eq!(json["adminDelivered"], true);
        assert_eq!(json["customerDelivered"], false);
        assert_eq!(json["retryScheduled"], false);
        // Absent rather than null.
        assert!(json.get("lastError").is_none());
    }

    #[test]
    fn test_stats_bucket_pending_and_failed() {
        let mut done = tracker("ord-1");
        done.admin_delivered = true;
        done.customer_delivered = true;
        done.delivered = true;
        done.attempts = 2;

        let mut waiting = tracker("ord-2");
        waiting.attempts = 4;

        let mut spent = tracker("ord-3");
        spent.attempts = 10;
        spent.customer_delivered = true;

        let stats = DeliveryStats::tally([&done, &waiting, &spent], 10);
        assert_eq!(
            stats,
            DeliveryStats {
                total: 3,
                admin_delivered: 1,
                customer_delivered: 2,
                pending: 1,
                failed: 1,
            }
        );
    }
}
