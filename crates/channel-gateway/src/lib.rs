//! WebSocket client for the Tavola channel gateway sidecar.
//!
//! Holds the socket to the gateway process, speaks the frame protocol over
//! it, correlates ACK/NACK replies with outbound sends, and exposes all of
//! that as the `ChannelTransport` implementation the session manager
//! consumes.

mod client;
mod error;
mod messages;

pub use client::{GatewayClient, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use messages::{GatewayMessage, GatewayMessageType};
