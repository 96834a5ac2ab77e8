//! Shared daemon state.

use std::sync::Arc;

use channel_session::ChannelManager;
use invoice_delivery::DeliveryService;

/// State shared by the control-socket handlers.
///
/// Cheap to clone; every connection task gets its own copy.
#[derive(Clone)]
pub struct AppState {
    /// Messaging-channel session supervisor.
    pub channel: Arc<ChannelManager>,
    /// Invoice delivery orchestrator.
    pub delivery: Arc<DeliveryService>,
}
