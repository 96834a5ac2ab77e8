//! Messaging-channel session management for the Tavola notification daemon.
//!
//! One long-lived session to the external messaging channel, held together
//! by an explicit connection state machine (Disconnected/Connecting/
//! Connected), automatic reconnection with exponential backoff and closure
//! classification, credential persistence so an authenticated session can
//! be resumed, and a readiness gate (`ensure_ready`) for components that
//! want to send.

mod credentials;
mod error;
mod manager;
mod state;
mod transport;

pub use credentials::{CredentialStore, FileCredentialStore};
pub use error::{ChannelError, ChannelResult};
pub use manager::{ChannelManager, SessionConfig};
pub use state::{ConnectionStatus, SessionState};
pub use transport::{
    ChannelEvent, ChannelTransport, CloseCause, DocumentPayload, SessionCredentials,
};
