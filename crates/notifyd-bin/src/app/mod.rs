//! Daemon assembly: component wiring, startup, and operator commands.

pub(crate) mod clients;
mod init;
mod lifecycle;
mod state;

pub use init::run_daemon;
pub use lifecycle::{show_status, stop_daemon};
pub use state::AppState;
