//! Connection state machine for the channel session.
//!
//! The session lifecycle is small enough to draw:
//!
//! ```text
//! ┌──────────────┐  OpenRequested   ┌──────────────┐
//! │ Disconnected │ ───────────────► │  Connecting  │
//! └──────────────┘                  └──────┬───────┘
//!        ▲                                 │ ChannelReady
//!        │ ChannelClosed                   ▼
//!        │                          ┌──────────────┐
//!        └───────────────────────── │  Connected   │
//!          (also from Connecting)   └──────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_fsm::*;
use serde::{Deserialize, Serialize};

// `state_machine!` expands to a `session_machine` module holding the
// `State` and `Input` enums and the `StateMachine` type.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Disconnected)

    Disconnected => {
        OpenRequested => Connecting
    },
    Connecting => {
        ChannelReady => Connected,
        ChannelClosed => Disconnected
    },
    Connected => {
        ChannelClosed => Disconnected
    }
}

// Flatten the generated module into names the rest of the crate uses.
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// User-friendly session state for external consumption.
///
/// This is a simplified view of the FSM state for the control socket and
/// status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session; nothing in flight.
    Disconnected,
    /// A session is being established (possibly waiting on a challenge scan).
    Connecting,
    /// The channel accepted the session; sends may proceed.
    Connected,
}

impl SessionState {
    /// Returns true if the session can carry sends right now.
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Disconnected => SessionState::Disconnected,
            SessionMachineState::Connecting => SessionState::Connecting,
            SessionMachineState::Connected => SessionState::Connected,
        }
    }
}

/// Snapshot of the channel connection, side-effect free.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Current session state.
    pub state: SessionState,
    /// Whether a previously-established session can be resumed without a
    /// fresh challenge scan.
    pub has_credentials: bool,
    /// Consecutive reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Timestamp of the most recent transition into Connected.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Scannable challenge payload, present only while connecting without
    /// credentials.
    pub pending_challenge: Option<String>,
}
