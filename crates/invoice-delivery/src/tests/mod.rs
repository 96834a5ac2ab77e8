//! Behavioral tests for the delivery pipeline.
//!
//! Organization:
//! - `harness.rs`     - scriptable fakes for the transport, order store and renderer
//! - `idempotency.rs` - repeat-delivery short-circuits and pre-tracker rejections
//! - `passes.rs`      - attempt accounting, readiness gate, write-once flags
//! - `retries.rs`     - backoff schedule, retry-timer guard, attempt exhaustion
//! - `priority.rs`    - admin-first success criterion, end-to-end recovery
//! - `sweep.rs`       - monitor SLA alerts and tracker retention

mod harness;
mod idempotency;
mod priority;
