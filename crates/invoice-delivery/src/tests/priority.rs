//! The admin-first success criterion, and the canonical two-pass recovery.

use std::time::Duration;

use super::harness::*;
use crate::error::{DeliveryErrorKind, PassOutcome};
use crate::tracker::DeliveryStats;

/// The admin notice is the success criterion: when it lands, the order is
/// delivered even though every customer attempt failed.
#[tokio::test]
async fn test_admin_success_with_customer_failure_still_delivers() {
    let harness = DeliveryHarness::new();
    harness.connect().await;
    harness.seed_order("ord-1", Some(CUSTOMER));
    harness.transport.script_documents(vec![
        ScriptedSend::Ack,
        ScriptedSend::Nack("customer unreachable"),
        ScriptedSend::Nack("customer unreachable"),
    ]);

    assert_eq!(harness.service.deliver("ord-1").await, PassOutcome::Delivered);

    let snapshot = harness.service.delivery_status("ord-1").await.unwrap();
    assert!(snapshot.delivered);
    assert!(snapshot.admin_delivered);
    assert!(!snapshot.customer_delivered);
    assert!(!snapshot.retry_scheduled);
    assert_eq!(snapshot.attempts, 1);
    let last_error = snapshot.last_error.unwrap();
    assert!(last_error.contains("customer send failed"), "{}", last_error);

    assert_eq!(
        harness.service.delivery_stats().await,
        DeliveryStats {
            total: 1,
            admin_delivered: 1,
            customer_delivered: 0,
            pending: 0,
            failed: 0,
        }
    );
}

/// Orders without a customer address go to the admin only; nothing is
/// counted against the customer.
#[tokio::test]
async fn test_customer_skipped_when_no_address() {
    let harness = DeliveryHarness::new();
    harness.connect().await;
    harness.seed_order("ord-2", None);

    assert_eq!(harness.service.deliver("ord-2").await, PassOutcome::Delivered);

    assert_eq!(harness.transport.document_count(), 1);
    assert_eq!(harness.transport.documents_to(ADMIN).len(), 1);
    let snapshot = harness.service.delivery_status("ord-2").await.unwrap();
    assert!(snapshot.customer_address.is_none());
    assert!(!snapshot.customer_delivered);
    assert!(snapshot.delivered);
}

/// Canonical recovery: the first pass finds the channel down, the retry
/// fires after the base delay, the admin copy lands, the customer copy
/// fails through its budget, and the order still completes on pass two.
#[tokio::test]
async fn test_order_501_recovers_and_delivers_on_second_pass() {
    let mut config = fast_delivery_config();
    config.retry_policy.base_delay = Duration::from_millis(400);
    config.retry_policy.cap_delay = Duration::from_millis(800);
    let harness = DeliveryHarness::with_config(config);
    harness.seed_order("ord-501", Some(CUSTOMER));

    // Pass 1: channel down. One attempt consumed, nothing sent.
    let outcome = harness.service.deliver("ord-501").await;
    match outcome {
        PassOutcome::Retrying { reason, delay } => {
            assert_eq!(reason, DeliveryErrorKind::ConnectionNotReady);
            assert_eq!(delay, Duration::from_millis(400));
        }
        other => panic!("expected retrying, got {:?}", other),
    }
    assert_eq!(harness.transport.document_count(), 0);

    // The channel comes back well before the timer fires. Pass 2: admin
    // lands, the customer fails both immediate retries.
    harness.transport.script_documents(vec![
        ScriptedSend::Ack,
        ScriptedSend::Nack("customer offline"),
        ScriptedSend::Nack("customer offline"),
    ]);
    harness.connect().await;
    harness.wait_for_delivered("ord-501").await;

    let snapshot = harness.service.delivery_status("ord-501").await.unwrap();
    assert_eq!(snapshot.attempts, 2);
    assert!(snapshot.admin_delivered);
    assert!(!snapshot.customer_delivered);
    assert!(snapshot.delivered);
    assert!(!snapshot.retry_scheduled);

    assert_eq!(harness.transport.documents_to(ADMIN).len(), 1);
    assert_eq!(harness.transport.documents_to(CUSTOMER).len(), 2);
    assert_eq!(
        harness.service.delivery_stats().await,
        DeliveryStats {
            total: 1,
            admin_delivered: 1,
            customer_delivered: 0,
            pending: 0,
            failed: 0,
        }
    );
}
