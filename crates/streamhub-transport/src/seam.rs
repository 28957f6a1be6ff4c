//! Protocol-agnostic seam between the lifecycle and a wire transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportError;
use crate::TransportResult;

/// One inbound or outbound message frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),

    /// Raw binary frame.
    Binary(Bytes),
}

/// One open network link.
pub trait Link: Send + Sync {
    /// Send a text frame. Fails only if the link is already closing.
    fn send_text(&self, text: &str) -> TransportResult<()>;

    /// Send a binary frame.
    fn send_binary(&self, data: Bytes) -> TransportResult<()>;

    /// Request an orderly close. Completion is reported via `on_close`.
    fn close(&self);
}

/// Callback surface driven by the transport's I/O tasks.
///
/// Exactly one `on_close` is delivered per `Transport::open`, after which no
/// further callbacks arrive for that link.
pub trait LinkHandler: Send + Sync {
    /// The transport accepted the open request and is about to dial.
    fn on_start(&self);

    /// The link is open and usable.
    fn on_open(&self, link: Arc<dyn Link>);

    /// An inbound frame arrived.
    fn on_frame(&self, frame: Frame);

    /// The link finished closing. `remote` is true when the peer (or the
    /// network) ended the link rather than a local `close`.
    fn on_close(&self, code: u16, reason: &str, remote: bool);

    /// A non-terminal error was observed on the link.
    fn on_error(&self, error: &TransportError);
}

/// Factory for network links.
///
/// `open` must not block: it enqueues the dial on the shared I/O runtime and
/// returns; the outcome arrives through the handler.
pub trait Transport: Send + Sync {
    /// Start opening a link to `target` with the given handshake timeout.
    fn open(&self, target: &str, timeout: Duration, handler: Arc<dyn LinkHandler>);
}
