//! Control socket: wire protocol, server, and client.

mod protocol;
mod server;

pub use protocol::{error_codes, ErrorInfo, Method, Request, Response};
pub use server::{ControlClient, ControlServer};
