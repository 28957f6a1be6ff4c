//! Connection state and reconnect pacing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS, MAX_RECONNECT_DELAY_SECS};

/// Authoritative state of one adapter's network link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,

    /// Handshake in flight.
    Connecting,

    /// Link is open and usable.
    Connected,

    /// Close requested, waiting for the link to finish closing.
    Disconnecting,

    /// Link lost, reconnect scheduled.
    Reconnecting,
}

impl ConnectionState {
    /// Check if the link is usable.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transient state (connecting or reconnecting).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
            Self::Reconnecting => "Reconnecting",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Connection options recognized by every adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Address of the external tool (e.g. "tcp://127.0.0.1:4444").
    pub server_address: String,

    /// Handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Base delay before a scheduled reconnect, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl ConnectionConfig {
    /// Handshake timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Base reconnect delay as a duration.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Reconnection pacing.
///
/// A dropped link is never fatal; the delay backs off exponentially from the
/// base and is capped, with no attempt limit.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Base delay between attempts (exponential backoff applied).
    pub base_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_delay: Duration::from_secs(MAX_RECONNECT_DELAY_SECS),
        }
    }
}

impl ReconnectPolicy {
    /// Derive the policy from an adapter's connection config.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            base_delay: config.reconnect_delay(),
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.pow(attempt.saturating_sub(1).min(16));
        let delay = self.base_delay.saturating_mul(multiplier as u32);
        delay.min(self.max_delay)
    }
}
