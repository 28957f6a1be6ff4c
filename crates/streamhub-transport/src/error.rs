//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur on a network link.
///
/// All of these are transient from the lifecycle's point of view: they end
/// the current link and lead to a scheduled reconnect, never to a dead
/// adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Target address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Connection attempt failed.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Connection attempt did not finish within the configured timeout.
    #[error("Connect timed out")]
    Timeout,

    /// Link is already closed.
    #[error("Link closed")]
    Closed,

    /// IO error on an established link.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
