//! HTTP adapters for the main application's internal API.
//!
//! The web app owns order data and invoice rendering; the daemon reaches
//! both over localhost HTTP with an optional bearer token.

use async_trait::async_trait;
use invoice_delivery::{
    InvoiceArtifact, InvoiceRenderer, Order, OrderStore, OrderStoreError, RenderError,
};
use reqwest::StatusCode;
use tracing::debug;

/// Response header carrying the rendered invoice's filename
/// (`X-Invoice-Filename`; lookup is case-insensitive).
const INVOICE_FILENAME_HEADER: &str = "x-invoice-filename";

fn fallback_filename(order_id: &str) -> String {
    format!("invoice-{}.pdf", order_id)
}

/// Order lookup against `GET {base}/internal/orders/{id}`.
pub struct HttpOrderStore {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpOrderStore {
    pub fn new(client: reqwest::Client, base_url: &str, api_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn order_url(&self, order_id: &str) -> String {
        format!("{}/internal/orders/{}", self.base_url, order_id)
    }
}

#[async_trait]
impl OrderStore for HttpOrderStore {
    async fn fetch(&self, order_id: &str) -> Result<Order, OrderStoreError> {
        let url = self.order_url(order_id);
        debug!(order_id = %order_id, url = %url, "fetching order");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OrderStoreError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(OrderStoreError::NotFound);
        }
        if !response.status().is_success() {
            return Err(OrderStoreError::Unavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json::<Order>()
            .await
            .map_err(|e| OrderStoreError::Unavailable(format!("invalid order payload: {}", e)))
    }
}

/// Invoice rendering against `POST {base}/internal/invoices/render`.
///
/// The response body is the document itself; the filename travels in the
/// `X-Invoice-Filename` header.
pub struct HttpInvoiceRenderer {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpInvoiceRenderer {
    pub fn new(client: reqwest::Client, base_url: &str, api_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn render_url(&self) -> String {
        format!("{}/internal/invoices/render", self.base_url)
    }
}

#[async_trait]
impl InvoiceRenderer for HttpInvoiceRenderer {
    async fn render(&self, order: &Order) -> Result<InvoiceArtifact, RenderError> {
        let url = self.render_url();
        debug!(order_id = %order.id, url = %url, "rendering invoice");

        let mut request = self.client.post(&url).json(order);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RenderError(format!("renderer unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(RenderError(format!(
                "renderer returned HTTP {}",
                response.status()
            )));
        }

        let filename = response
            .headers()
            .get(INVOICE_FILENAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_filename(&order.id));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError(format!("invoice body read failed: {}", e)))?;

        Ok(InvoiceArtifact::new(filename, bytes.to_vec()))
    }
}
