//! Repeat-delivery short-circuits and pre-tracker rejections.

use super::harness::*;
use crate::error::{DeliveryErrorKind, PassOutcome};

/// A delivered order never costs another channel send, no matter how many
/// times delivery is requested.
#[tokio::test]
async fn test_delivered_order_short_circuits_without_sends() {
    let harness = DeliveryHarness::new();
    harness.connect().await;
    harness.seed_order("ord-1", Some(CUSTOMER));

    assert_eq!(harness.service.deliver("ord-1").await, PassOutcome::Delivered);
    let sends_after_first = harness.transport.document_count();
    assert_eq!(sends_after_first, 2);

    assert_eq!(harness.service.deliver("ord-1").await, PassOutcome::Delivered);
    assert_eq!(harness.service.deliver("ord-1").await, PassOutcome::Delivered);

    assert_eq!(harness.transport.document_count(), sends_after_first);
    let snapshot = harness.service.delivery_status("ord-1").await.unwrap();
    assert_eq!(snapshot.attempts, 1);
    assert!(snapshot.delivered);
}

/// Two concurrent triggers for the same order may interleave, but the
/// damage is bounded: at most one redundant pass, success recorded once.
#[tokio::test]
async fn test_duplicate_triggers_cost_at_most_one_redundant_pass() {
    let harness = DeliveryHarness::new();
    harness.connect().await;
    harness.seed_order("ord-1", None);

    assert!(harness.service.trigger_delivery("ord-1"));
    assert!(harness.service.trigger_delivery("ord-1"));
    harness.wait_for_delivered("ord-1").await;

    let snapshot = harness.service.delivery_status("ord-1").await.unwrap();
    assert!(snapshot.attempts <= 2, "attempts = {}", snapshot.attempts);
    let admin_sends = harness.transport.documents_to(ADMIN).len();
    assert!((1..=2).contains(&admin_sends), "admin sends = {}", admin_sends);

    let stats = harness.service.delivery_stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.admin_delivered, 1);
}

/// An unknown order is rejected outright; no tracker, no retries.
#[tokio::test]
async fn test_unknown_order_rejected_without_tracker() {
    let harness = DeliveryHarness::new();
    harness.connect().await;

    let outcome = harness.service.deliver("ord-missing").await;
    assert_eq!(
        outcome,
        PassOutcome::Rejected {
            reason: DeliveryErrorKind::OrderNotFound,
        }
    );

    assert!(harness.service.delivery_status("ord-missing").await.is_none());
    assert_eq!(harness.orders.fetch_calls(), 1);
    assert_eq!(harness.transport.document_count(), 0);
}

/// A rendering failure rejects the request without a tracker, so a later
/// trigger starts over and renders again.
#[tokio::test]
async fn test_render_failure_rejected_then_recovers() {
    let harness = DeliveryHarness::new();
    harness.connect().await;
    harness.seed_order("ord-1", None);
    harness.renderer.queue_failure("template exploded");

    let outcome = harness.service.deliver("ord-1").await;
    match outcome {
        PassOutcome::Rejected {
            reason: DeliveryErrorKind::ArtifactGeneration(detail),
        } => assert!(detail.contains("template exploded"), "detail = {}", detail),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(harness.service.delivery_status("ord-1").await.is_none());

    assert_eq!(harness.service.deliver("ord-1").await, PassOutcome::Delivered);
    assert_eq!(harness.renderer.render_calls(), 2);
}

/// An order-store outage also rejects before any tracker exists.
#[tokio::test]
async fn test_order_store_outage_rejected_without_tracker() {
    let harness = DeliveryHarness::new();
    harness.connect().await;
    harness.seed_order("ord-1", None);
    harness.orders.queue_outage("connection refused");

    let outcome = harness.service.deliver("ord-1").await;
    match outcome {
        PassOutcome::Rejected {
            reason: DeliveryErrorKind::ArtifactGeneration(detail),
        } => assert!(detail.contains("order fetch failed"), "detail = {}", detail),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(harness.service.delivery_status("ord-1").await.is_none());

    // The outage was transient; the next trigger goes through.
    assert_eq!(harness.service.deliver("ord-1").await, PassOutcome::Delivered);
}

/// Blank order ids are not accepted for background delivery.
#[tokio::test]
async fn test_blank_order_id_not_accepted() {
    let harness = DeliveryHarness::new();

    assert!(!harness.service.trigger_delivery(""));
    assert!(!harness.service.trigger_delivery("   "));

    assert_eq!(harness.service.delivery_stats().await.total, 0);
}
