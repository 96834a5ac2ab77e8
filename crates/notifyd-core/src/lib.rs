//! Core types, configuration, and utilities for the Tavola notification daemon.

mod backoff;
mod config;
mod error;
mod logging;
mod paths;

pub use backoff::RetryPolicy;
pub use config::{Config, DEFAULT_APP_BASE_URL, DEFAULT_GATEWAY_URL, DEFAULT_LOG_LEVEL};
pub use error::{SetupError, SetupResult};
pub use logging::init_logging;
pub use paths::Paths;
