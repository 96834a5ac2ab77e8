//! Order invoice delivery for the Tavola notification daemon.
//!
//! When an order is placed, the pipeline fetches it from the main
//! application, renders the invoice document, and pushes it over the
//! messaging channel: to the operating administrator first (the success
//! criterion), then best-effort to the customer. Failed passes back off
//! geometrically, and an independent monitor sends degraded-mode alerts
//! for orders that blow through their delivery window.
//!
//! Layering, top to bottom:
//! - [`DeliveryMonitor`]: periodic sweep, SLA alerts, tracker retention
//! - [`DeliveryService`]: per-order orchestration and retry scheduling
//! - [`DocumentSender`]: one document to one address, immediate retries
//! - [`channel_session::ChannelManager`]: the session itself

mod archive;
mod error;
mod monitor;
mod ports;
mod sender;
mod service;
mod tracker;

#[cfg(test)]
mod tests;

pub use archive::FsArchive;
pub use error::{DeliveryErrorKind, PassOutcome, SendFailure};
pub use monitor::{DeliveryMonitor, MonitorConfig, SweepReport};
pub use ports::{ArtifactArchive, InvoiceRenderer, Order, OrderStore, OrderStoreError, RenderError};
pub use sender::{DocumentSender, SenderConfig};
pub use service::{DeliveryConfig, DeliveryService};
pub use tracker::{DeliveryStats, DeliveryTracker, InvoiceArtifact, TrackerSnapshot};
