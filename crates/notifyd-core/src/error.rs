//! Error type shared by the daemon's foundation layer.

use thiserror::Error;

/// Failures raised while loading configuration or preparing the runtime
/// directory layout. These are startup-time errors; once the daemon is
/// running, the delivery pipeline carries its own error types.
#[derive(Error, Debug)]
pub enum SetupError {
    /// A required config value is missing or unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The invoking user has no resolvable home directory.
    #[error("home directory not found")]
    HomeNotFound,

    /// Reading or writing under the base directory failed.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// A configured URL does not parse.
    #[error("malformed URL: {0}")]
    Url(#[from] url::ParseError),

    /// The config file is not valid JSON.
    #[error("malformed config JSON: {0}")]
    ConfigJson(#[from] serde_json::Error),
}

pub type SetupResult<T> = Result<T, SetupError>;
