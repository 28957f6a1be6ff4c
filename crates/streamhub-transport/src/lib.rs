//! Resilient connection lifecycle shared by all protocol adapters.
//!
//! Every adapter drives its network link through the same state machine:
//! connect, observe open/close callbacks from the shared I/O runtime, and
//! schedule reconnects when the link drops. The wire protocol itself lives
//! behind the [`Transport`] seam.

mod connection;
mod error;
mod lifecycle;
mod seam;
mod tcp;

pub use connection::{ConnectionConfig, ConnectionState, ReconnectPolicy};
pub use error::TransportError;
pub use lifecycle::{ConnectionEvents, ConnectionLifecycle};
pub use seam::{Frame, Link, LinkHandler, Transport};
pub use tcp::TcpTransport;

/// Close code for an orderly, locally initiated close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code for an abnormal loss of the link.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default base reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Cap applied to the reconnect backoff.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
