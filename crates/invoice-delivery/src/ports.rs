//! Ports to the surrounding application.
//!
//! The pipeline itself never speaks HTTP or touches disk directly; it goes
//! through these traits so the daemon can wire real clients in production
//! and scripted fakes in tests.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tracker::InvoiceArtifact;

/// One order as the main application stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    /// Channel address of the customer, when they provided one.
    pub customer_address: Option<String>,
    pub total_cents: i64,
    pub placed_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum OrderStoreError {
    #[error("order not found")]
    NotFound,
    #[error("order store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
#[error("invoice rendering failed: {0}")]
pub struct RenderError(pub String);

/// Looks up orders in the main application.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn fetch(&self, order_id: &str) -> Result<Order, OrderStoreError>;
}

/// Produces the invoice document for an order.
#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render(&self, order: &Order) -> Result<InvoiceArtifact, RenderError>;
}

/// Fallback store for rendered invoices, so the document survives locally
/// even when the channel never comes back. Failures here are logged and
/// swallowed; archiving never blocks delivery.
pub trait ArtifactArchive: Send + Sync {
    fn store(&self, order_id: &str, artifact: &InvoiceArtifact) -> std::io::Result<PathBuf>;
}
