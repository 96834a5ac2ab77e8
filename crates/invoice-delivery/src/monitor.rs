//! Guaranteed-delivery monitor.
//!
//! A periodic sweep independent of the retry scheduler. Orders whose admin
//! notice is overdue get a degraded-mode text alert to the administrator,
//! once per sweep, until a pass finally lands the invoice. Delivered
//! trackers are pruned once they age out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use channel_session::ChannelManager;

use crate::service::DeliveryService;
use crate::tracker::TrackerSnapshot;

/// Tuning for the monitor sweep.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub sweep_interval: Duration,
    /// Maximum tolerable age of an order with no admin notice before the
    /// emergency text goes out.
    pub sla: Duration,
    /// Age past which delivered trackers are dropped.
    pub retention: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            sla: Duration::from_secs(300),
            retention: Duration::from_secs(3600),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Emergency texts that reached the channel.
    pub emergency_notices: usize,
    /// Emergency texts that could not be sent; the next sweep tries again.
    pub failed_notices: usize,
    /// Delivered trackers pruned this sweep.
    pub removed: usize,
}

/// Watches the tracker table from the outside.
///
/// The monitor never runs delivery passes and never touches the delivered
/// flags or retry timers; its only write is pruning delivered trackers.
pub struct DeliveryMonitor {
    service: Arc<DeliveryService>,
    channel: Arc<ChannelManager>,
    config: MonitorConfig,
}

impl DeliveryMonitor {
    pub fn new(
        service: Arc<DeliveryService>,
        channel: Arc<ChannelManager>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            service,
            channel,
            config,
        }
    }

    /// Start the periodic sweep loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            sweep_interval_ms = self.config.sweep_interval.as_millis() as u64,
            sla_ms = self.config.sla.as_millis() as u64,
            retention_ms = self.config.retention.as_millis() as u64,
            "delivery monitor started"
        );
        tokio::spawn(async move {
            let mut ticker = interval(self.config.sweep_interval);
            loop {
                ticker.tick().await;
                let report = self.sweep_at(Utc::now()).await;
                if report != SweepReport::default() {
                    info!(
                        notices = report.emergency_notices,
                        failed = report.failed_notices,
                        removed = report.removed,
                        "monitor sweep"
                    );
                }
            }
        })
    }

    /// Run one sweep against the given clock.
    ///
    /// Takes `now` as a parameter so age checks can be driven directly.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for tracker in self.service.snapshot_all().await {
            if tracker.admin_delivered || !tracker.older_than(now, self.config.sla) {
                continue;
            }

            let notice = emergency_notice(&tracker);
            match self.channel.send_text(&tracker.admin_address, &notice).await {
                Ok(()) => {
                    warn!(
                        order_id = %tracker.order_id,
                        attempts = tracker.attempts,
                        "sent emergency notice for overdue order"
                    );
                    report.emergency_notices += 1;
                }
                Err(error) => {
                    warn!(
                        order_id = %tracker.order_id,
                        error = %error,
                        "could not send emergency notice"
                    );
                    report.failed_notices += 1;
                }
            }
        }

        report.removed = self.service.prune_delivered(now, self.config.retention).await;
        if report.removed > 0 {
            debug!(removed = report.removed, "pruned delivered trackers");
        }

        report
    }
}

fn emergency_notice(tracker: &TrackerSnapshot) -> String {
    format!(
        "URGENT: invoice for order {} is still undelivered after {} attempt(s). Customer: {}. Check the channel connection.",
        tracker.order_id,
        tracker.attempts,
        tracker.customer_address.as_deref().unwrap_or("unknown"),
    )
}
