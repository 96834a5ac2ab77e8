//! Configuration management for the notification daemon.

use crate::{Paths, SetupError, SetupResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default base URL of the main application's internal API
/// (can be overridden at compile time via TAVOLA_APP_URL env var).
pub const DEFAULT_APP_BASE_URL: &str = match option_env!("TAVOLA_APP_URL") {
    Some(url) => url,
    None => "http://127.0.0.1:3000",
};

/// Default WebSocket URL of the channel gateway sidecar.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:8790/session";

/// Log level when neither the file nor the environment sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Daemon configuration, merged from the config file and `TAVOLA_*`
/// environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracing filter directive (`info`, `debug`, ...).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the main application's internal API (order store, renderer).
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
    /// Bearer token for the internal API (optional in development).
    #[serde(default)]
    pub app_api_token: Option<String>,
    /// WebSocket URL of the channel gateway sidecar.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Channel address of the operating administrator. Required at startup.
    #[serde(default)]
    pub admin_address: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_app_base_url() -> String {
    DEFAULT_APP_BASE_URL.to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            app_base_url: default_app_base_url(),
            app_api_token: None,
            gateway_url: default_gateway_url(),
            admin_address: String::new(),
        }
    }
}

impl Config {
    /// Defaults plus environment overrides, without touching the filesystem.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load the config file if it exists, then apply environment overrides.
    /// A missing file is not an error; an unparseable one is.
    pub fn load(paths: &Paths) -> SetupResult<Self> {
        let path = paths.config_file();
        let mut config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        config.load_from_env();
        Ok(config)
    }

    /// Read one specific config file.
    pub fn load_from_file(path: &Path) -> SetupResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the config file, creating the base directory when needed.
    pub fn save(&self, paths: &Paths) -> SetupResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `TAVOLA_*` environment overrides.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    // Overrides go through an injected lookup so tests never mutate
    // process-global environment state.
    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(log_level) = get("TAVOLA_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(app_url) = get("TAVOLA_APP_URL") {
            self.app_base_url = app_url;
        }
        if let Some(token) = get("TAVOLA_APP_TOKEN") {
            self.app_api_token = Some(token);
        }
        if let Some(gateway_url) = get("TAVOLA_GATEWAY_URL") {
            self.gateway_url = gateway_url;
        }
        if let Some(admin_address) = get("TAVOLA_ADMIN_ADDRESS") {
            self.admin_address = admin_address;
        }
    }

    /// Get the app base URL as a parsed URL.
    pub fn app_base_url(&self) -> SetupResult<Url> {
        Url::parse(&self.app_base_url).map_err(SetupError::from)
    }

    /// Get the gateway URL as a parsed URL.
    pub fn gateway_url(&self) -> SetupResult<Url> {
        Url::parse(&self.gateway_url).map_err(SetupError::from)
    }

    /// The admin channel address, or a configuration error when unset.
    ///
    /// Delivery cannot run without it, so the binary checks this once at
    /// startup rather than per order.
    pub fn require_admin_address(&self) -> SetupResult<&str> {
        if self.admin_address.is_empty() {
            return Err(SetupError::InvalidConfig(
                "admin_address is not set (config file or TAVOLA_ADMIN_ADDRESS)".to_string(),
            ));
        }
        Ok(&self.admin_address)
    }
}
