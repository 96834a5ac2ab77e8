//! Runtime directory layout.
//!
//! Everything the daemon touches on disk lives under one base directory,
//! `~/.tavola` by default:
//!
//! ```text
//! ~/.tavola/
//!   config.json               daemon configuration
//!   notifyd.sock              control socket
//!   notifyd.pid               pid of the running daemon
//!   credentials/channel.json  persisted channel session
//!   invoices/                 archived invoice artifacts
//!   logs/                     operator log captures
//! ```

use crate::{SetupError, SetupResult};
use std::path::PathBuf;

const CONTROL_SOCKET_NAME: &str = "notifyd.sock";
const CHANNEL_CREDENTIALS_NAME: &str = "channel.json";

/// Resolves every daemon file location from a single base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Layout rooted at `~/.tavola` in the invoking user's home.
    pub fn new() -> SetupResult<Self> {
        let home = dirs::home_dir().ok_or(SetupError::HomeNotFound)?;

        Ok(Self {
            base_dir: home.join(".tavola"),
        })
    }

    /// Layout rooted at an explicit directory (`--base-dir`, tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn socket_file(&self) -> PathBuf {
        self.base_dir.join(CONTROL_SOCKET_NAME)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("notifyd.pid")
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.base_dir.join("credentials")
    }

    pub fn channel_credentials_file(&self) -> PathBuf {
        self.credentials_dir().join(CHANNEL_CREDENTIALS_NAME)
    }

    pub fn invoices_dir(&self) -> PathBuf {
        self.base_dir.join("invoices")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Create every directory the daemon writes into.
    pub fn ensure_dirs(&self) -> SetupResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.credentials_dir())?;
        std::fs::create_dir_all(self.invoices_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().expect("home directory resolution failed")
    }
}
