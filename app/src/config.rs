//! Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use streamhub_transport::{
    ConnectionConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS,
};

/// Connection section for one adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSection {
    /// Whether the adapter is wired up at startup.
    pub enabled: bool,

    /// Address of the external tool (e.g. "tcp://127.0.0.1:4444").
    pub server_address: String,

    /// Handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Base delay before a scheduled reconnect, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for AdapterSection {
    fn default() -> Self {
        Self {
            enabled: false,
            server_address: String::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl AdapterSection {
    /// Connection options for the adapter's lifecycle.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            server_address: self.server_address.clone(),
            connect_timeout_ms: self.connect_timeout_ms,
            reconnect_delay_ms: self.reconnect_delay_ms,
        }
    }
}

/// Top-level configuration for the hub.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path of the durable state database. In-memory records only if unset.
    pub state_db: Option<PathBuf>,

    /// Video switcher connection.
    pub switcher: AdapterSection,

    /// Music-player daemon connection.
    pub player: AdapterSection,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}
