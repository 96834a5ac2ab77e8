//! Per-order delivery orchestration.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use channel_session::ChannelManager;
use notifyd_core::RetryPolicy;

use crate::error::{DeliveryErrorKind, PassOutcome};
use crate::ports::{ArtifactArchive, InvoiceRenderer, OrderStore, OrderStoreError};
use crate::sender::{DocumentSender, SenderConfig};
use crate::tracker::{DeliveryStats, DeliveryTracker, InvoiceArtifact, TrackerSnapshot};

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// How long one pass waits for the channel session before giving up
    /// and scheduling a retry.
    pub ready_wait: Duration,
    /// Orchestration passes per order. Past this, the monitor is the only
    /// remaining safety net.
    pub max_attempts: u32,
    /// Immediate-retry budget for the admin send.
    pub admin_immediate_retries: u32,
    /// Immediate-retry budget for the customer send.
    pub customer_immediate_retries: u32,
    /// Delay schedule between orchestration passes.
    pub retry_policy: RetryPolicy,
    pub sender: SenderConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ready_wait: Duration::from_secs(15),
            max_attempts: 10,
            admin_immediate_retries: 3,
            customer_immediate_retries: 2,
            retry_policy: RetryPolicy::default(),
            sender: SenderConfig::default(),
        }
    }
}

/// What one pass needs from the tracker, copied out so no lock is held
/// across channel sends.
struct PassPlan {
    attempts: u32,
    admin_address: String,
    admin_pending: bool,
    customer_address: Option<String>,
    artifact: InvoiceArtifact,
}

/// Drives each order's invoice notification to completion.
///
/// A "pass" is one run of [`deliver`](Self::deliver): make sure the
/// channel is up, push the invoice to the administrator (and, best-effort,
/// to the customer), and either finish or arm a retry timer. The admin
/// send is the success criterion; the customer send never blocks it.
pub struct DeliveryService {
    config: DeliveryConfig,
    channel: Arc<ChannelManager>,
    orders: Arc<dyn OrderStore>,
    renderer: Arc<dyn InvoiceRenderer>,
    archive: Option<Arc<dyn ArtifactArchive>>,
    sender: DocumentSender,
    admin_address: String,
    trackers: RwLock<HashMap<String, DeliveryTracker>>,
}

impl DeliveryService {
    pub fn new(
        channel: Arc<ChannelManager>,
        orders: Arc<dyn OrderStore>,
        renderer: Arc<dyn InvoiceRenderer>,
        archive: Option<Arc<dyn ArtifactArchive>>,
        admin_address: String,
        config: DeliveryConfig,
    ) -> Self {
        let sender = DocumentSender::new(Arc::clone(&channel), config.sender.clone());
        Self {
            config,
            channel,
            orders,
            renderer,
            archive,
            sender,
            admin_address,
            trackers: RwLock::new(HashMap::new()),
        }
    }

    /// Kick off a delivery pass in the background.
    ///
    /// Returns false only for a blank order id; acceptance says nothing
    /// about the eventual outcome.
    pub fn trigger_delivery(self: &Arc<Self>, order_id: &str) -> bool {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return false;
        }

        let service = Arc::clone(self);
        let order_id = order_id.to_string();
        tokio::spawn(async move {
            let outcome = service.deliver(&order_id).await;
            if !outcome.succeeded() {
                debug!(order_id = %order_id, outcome = ?outcome, "triggered pass did not complete delivery");
            }
        });
        true
    }

    /// Run one orchestration pass for `order_id`.
    ///
    /// Safe to call any number of times, from triggers, retry timers and
    /// overlapping requests alike: a delivered order short-circuits before
    /// any channel traffic, and the delivered flags are write-once.
    pub async fn deliver(self: &Arc<Self>, order_id: &str) -> PassOutcome {
        if let Some(tracker) = self.trackers.read().await.get(order_id) {
            if tracker.delivered {
                debug!(order_id = %order_id, "already delivered, nothing to do");
                return PassOutcome::Delivered;
            }
        }

        // First sight of this order: fetch and render before any tracker
        // exists, so a failure here rejects the request and a later
        // trigger starts over from scratch.
        let rendered = if self.trackers.read().await.contains_key(order_id) {
            None
        } else {
            match self.prepare_artifact(order_id).await {
                Ok(prepared) => Some(prepared),
                Err(reason) => return PassOutcome::Rejected { reason },
            }
        };

        let plan = {
            let mut trackers = self.trackers.write().await;
            let tracker = match trackers.entry(order_id.to_string()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match rendered {
                    Some((customer_address, artifact)) => {
                        info!(
                            order_id = %order_id,
                            customer = customer_address.as_deref().unwrap_or("none"),
                            artifact_bytes = artifact.size(),
                            "tracking new order delivery"
                        );
                        entry.insert(DeliveryTracker::new(
                            order_id,
                            &self.admin_address,
                            customer_address,
                            artifact,
                        ))
                    }
                    // The tracker was delivered and pruned between the
                    // short-circuit check and this lock.
                    None => return PassOutcome::Delivered,
                },
            };

            if tracker.delivered {
                return PassOutcome::Delivered;
            }

            // Every pass costs one attempt, whether or not a send happens.
            tracker.attempts += 1;
            PassPlan {
                attempts: tracker.attempts,
                admin_address: tracker.admin_address.clone(),
                admin_pending: !tracker.admin_delivered,
                customer_address: if tracker.customer_delivered {
                    None
                } else {
                    tracker.customer_address.clone()
                },
                artifact: tracker.artifact.clone(),
            }
        };

        info!(order_id = %order_id, attempt = plan.attempts, "delivery pass starting");

        if !self.channel.ensure_ready(self.config.ready_wait).await {
            warn!(
                order_id = %order_id,
                attempt = plan.attempts,
                "channel not ready, no sends attempted this pass"
            );
            return self
                .schedule_or_exhaust(order_id, DeliveryErrorKind::ConnectionNotReady)
                .await;
        }

        let mut admin_failure = None;
        if plan.admin_pending {
            match self
                .sender
                .send(
                    &plan.admin_address,
                    &plan.artifact,
                    &admin_caption(order_id),
                    self.config.admin_immediate_retries,
                )
                .await
            {
                Ok(()) => {
                    info!(order_id = %order_id, attempt = plan.attempts, "admin invoice delivered");
                    self.mark_admin_delivered(order_id).await;
                }
                Err(failure) => {
                    warn!(
                        order_id = %order_id,
                        attempt = plan.attempts,
                        error = %failure,
                        "admin invoice delivery failed"
                    );
                    admin_failure = Some(DeliveryErrorKind::from(&failure));
                }
            }
        }

        // Customer delivery is a courtesy: attempted whenever an address
        // is known and not yet served, never allowed to fail the pass.
        if let Some(customer_address) = &plan.customer_address {
            match self
                .sender
                .send(
                    customer_address,
                    &plan.artifact,
                    &customer_caption(order_id),
                    self.config.customer_immediate_retries,
                )
                .await
            {
                Ok(()) => {
                    info!(order_id = %order_id, "customer invoice delivered");
                    self.mark_customer_delivered(order_id).await;
                }
                Err(failure) => {
                    debug!(order_id = %order_id, error = %failure, "customer invoice delivery failed");
                    self.note_customer_failure(order_id, &failure.to_string())
                        .await;
                }
            }
        }

        match admin_failure {
            None => self.complete(order_id).await,
            Some(reason) => self.schedule_or_exhaust(order_id, reason).await,
        }
    }

    /// Fetch the order and render its invoice. Runs only while no tracker
    /// exists for the order.
    async fn prepare_artifact(
        &self,
        order_id: &str,
    ) -> Result<(Option<String>, InvoiceArtifact), DeliveryErrorKind> {
        let order = match self.orders.fetch(order_id).await {
            Ok(order) => order,
            Err(OrderStoreError::NotFound) => {
                warn!(order_id = %order_id, "order not found, delivery rejected");
                return Err(DeliveryErrorKind::OrderNotFound);
            }
            Err(OrderStoreError::Unavailable(detail)) => {
                warn!(order_id = %order_id, detail = %detail, "order store unavailable, delivery rejected");
                return Err(DeliveryErrorKind::ArtifactGeneration(format!(
                    "order fetch failed: {detail}"
                )));
            }
        };

        let artifact = match self.renderer.render(&order).await {
            Ok(artifact) => artifact,
            Err(error) => {
                warn!(order_id = %order_id, error = %error, "invoice rendering failed, delivery rejected");
                return Err(DeliveryErrorKind::ArtifactGeneration(error.to_string()));
            }
        };

        // The invoice exists now; make sure it survives locally even if
        // the channel never comes back.
        if let Some(archive) = &self.archive {
            if let Err(error) = archive.store(order_id, &artifact) {
                warn!(order_id = %order_id, error = %error, "failed to archive invoice");
            }
        }

        Ok((order.customer_address, artifact))
    }

    /// Close out a pass whose admin send is done (now or previously).
    async fn complete(&self, order_id: &str) -> PassOutcome {
        if let Some(tracker) = self.trackers.write().await.get_mut(order_id) {
            if !tracker.delivered {
                tracker.delivered = true;
                info!(
                    order_id = %order_id,
                    attempts = tracker.attempts,
                    customer_delivered = tracker.customer_delivered,
                    "order delivery complete"
                );
            }
        }
        PassOutcome::Delivered
    }

    /// Close out a failed pass: record the error, then either arm the
    /// retry timer or declare the order exhausted.
    async fn schedule_or_exhaust(
        self: &Arc<Self>,
        order_id: &str,
        reason: DeliveryErrorKind,
    ) -> PassOutcome {
        let delay = {
            let mut trackers = self.trackers.write().await;
            let Some(tracker) = trackers.get_mut(order_id) else {
                // Only delivered trackers are ever pruned.
                return PassOutcome::Delivered;
            };

            // An interleaved pass may have landed the admin notice while
            // this one was failing; never arm a retry for a delivered order.
            if tracker.admin_delivered {
                tracker.delivered = true;
                return PassOutcome::Delivered;
            }

            tracker.last_error = Some(reason.to_string());

            if tracker.attempts >= self.config.max_attempts {
                warn!(
                    order_id = %order_id,
                    attempts = tracker.attempts,
                    error = %reason,
                    "delivery attempts exhausted, leaving the order to the monitor"
                );
                return PassOutcome::Exhausted {
                    reason: DeliveryErrorKind::MaxAttemptsExceeded(Box::new(reason)),
                };
            }

            let delay = self.config.retry_policy.delay_for_attempt(tracker.attempts);
            if tracker.retry_scheduled {
                debug!(order_id = %order_id, "retry timer already armed");
                return PassOutcome::Retrying { reason, delay };
            }
            tracker.retry_scheduled = true;
            delay
        };

        info!(
            order_id = %order_id,
            delay_ms = delay.as_millis() as u64,
            error = %reason,
            "delivery retry scheduled"
        );
        self.spawn_retry(order_id.to_string(), delay);
        PassOutcome::Retrying { reason, delay }
    }

    fn spawn_retry(self: &Arc<Self>, order_id: String, delay: Duration) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            sleep(delay).await;
            service.clear_retry_flag(&order_id).await;
            let outcome = service.deliver(&order_id).await;
            debug!(order_id = %order_id, outcome = ?outcome, "scheduled retry pass finished");
        });
    }

    async fn clear_retry_flag(&self, order_id: &str) {
        if let Some(tracker) = self.trackers.write().await.get_mut(order_id) {
            tracker.retry_scheduled = false;
        }
    }

    async fn mark_admin_delivered(&self, order_id: &str) {
        if let Some(tracker) = self.trackers.write().await.get_mut(order_id) {
            tracker.admin_delivered = true;
        }
    }

    async fn mark_customer_delivered(&self, order_id: &str) {
        if let Some(tracker) = self.trackers.write().await.get_mut(order_id) {
            tracker.customer_delivered = true;
        }
    }

    async fn note_customer_failure(&self, order_id: &str, detail: &str) {
        if let Some(tracker) = self.trackers.write().await.get_mut(order_id) {
            tracker.last_error = Some(format!("customer send failed: {detail}"));
        }
    }

    /// Status snapshot for one order, if it is tracked.
    pub async fn delivery_status(&self, order_id: &str) -> Option<TrackerSnapshot> {
        self.trackers
            .read()
            .await
            .get(order_id)
            .map(TrackerSnapshot::from)
    }

    /// Aggregate counts over all live trackers.
    pub async fn delivery_stats(&self) -> DeliveryStats {
        let trackers = self.trackers.read().await;
        DeliveryStats::tally(trackers.values(), self.config.max_attempts)
    }

    /// Snapshots of every live tracker, for the monitor sweep.
    pub async fn snapshot_all(&self) -> Vec<TrackerSnapshot> {
        self.trackers
            .read()
            .await
            .values()
            .map(TrackerSnapshot::from)
            .collect()
    }

    /// Drop delivered trackers older than `retention`. Undelivered orders
    /// are kept indefinitely.
    pub async fn prune_delivered(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut trackers = self.trackers.write().await;
        let before = trackers.len();
        trackers.retain(|_, tracker| !(tracker.delivered && tracker.older_than(now, retention)));
        before - trackers.len()
    }
}

fn admin_caption(order_id: &str) -> String {
    format!("New order {}: invoice attached", order_id)
}

fn customer_caption(order_id: &str) -> String {
    format!(
        "Thank you for your order {}! Your invoice is attached.",
        order_id
    )
}
