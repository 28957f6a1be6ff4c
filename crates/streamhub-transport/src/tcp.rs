//! Line-framed TCP transport.
//!
//! Frames are newline-delimited UTF-8 payloads, which is what the bridged
//! tools speak once the outer protocol envelope is stripped. Each `open`
//! spawns a dial task on the shared runtime; reader and writer halves run as
//! their own tasks and report back through the handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::seam::{Frame, Link, LinkHandler, Transport};
use crate::{TransportResult, CLOSE_ABNORMAL, CLOSE_NORMAL};

enum Outbound {
    Data(Vec<u8>),
    Shutdown,
}

struct TcpLink {
    out_tx: UnboundedSender<Outbound>,
    close_notify: Arc<Notify>,
    local_close: AtomicBool,
}

impl Link for TcpLink {
    fn send_text(&self, text: &str) -> TransportResult<()> {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');
        self.out_tx
            .send(Outbound::Data(data))
            .map_err(|_| TransportError::Closed)
    }

    fn send_binary(&self, data: Bytes) -> TransportResult<()> {
        self.out_tx
            .send(Outbound::Data(data.to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.local_close.store(true, Ordering::SeqCst);
        let _ = self.out_tx.send(Outbound::Shutdown);
        self.close_notify.notify_waiters();
    }
}

/// Transport dialing plain TCP with newline framing.
pub struct TcpTransport {
    runtime: Handle,
}

impl TcpTransport {
    /// Create a transport spawning its I/O tasks on the given runtime.
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Transport for TcpTransport {
    fn open(&self, target: &str, timeout: Duration, handler: Arc<dyn LinkHandler>) {
        handler.on_start();
        let target = target.to_string();
        self.runtime.spawn(run_link(target, timeout, handler));
    }
}

async fn run_link(target: String, timeout: Duration, handler: Arc<dyn LinkHandler>) {
    let addr = match parse_target(&target) {
        Ok(addr) => addr,
        Err(e) => {
            handler.on_error(&e);
            handler.on_close(CLOSE_ABNORMAL, "invalid address", false);
            return;
        }
    };

    debug!(addr = %addr, "Dialing");
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            handler.on_error(&TransportError::Connect(e.to_string()));
            handler.on_close(CLOSE_ABNORMAL, "connect failed", true);
            return;
        }
        Err(_) => {
            handler.on_error(&TransportError::Timeout);
            handler.on_close(CLOSE_ABNORMAL, "connect timed out", true);
            return;
        }
    };

    let (read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let close_notify = Arc::new(Notify::new());

    let link = Arc::new(TcpLink {
        out_tx,
        close_notify: Arc::clone(&close_notify),
        local_close: AtomicBool::new(false),
    });

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                Outbound::Data(data) => {
                    if write_half.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Outbound::Shutdown => {
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
        }
    });

    handler.on_open(link.clone());

    let mut lines = BufReader::new(read_half).lines();
    let (code, reason, remote) = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    trace!(len = line.len(), "Frame received");
                    handler.on_frame(Frame::Text(line));
                }
                Ok(None) => {
                    if link.local_close.load(Ordering::SeqCst) {
                        break (CLOSE_NORMAL, "closed", false);
                    }
                    break (CLOSE_ABNORMAL, "connection lost", true);
                }
                Err(e) => {
                    if link.local_close.load(Ordering::SeqCst) {
                        break (CLOSE_NORMAL, "closed", false);
                    }
                    handler.on_error(&TransportError::Io(e));
                    break (CLOSE_ABNORMAL, "read error", true);
                }
            },
            _ = close_notify.notified() => {
                break (CLOSE_NORMAL, "closed", false);
            }
        }
    };

    writer.abort();
    debug!(code, reason, remote, "Link closed");
    handler.on_close(code, reason, remote);
}

fn parse_target(target: &str) -> Result<String, TransportError> {
    if target.contains("://") {
        let parsed = url::Url::parse(target)
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?;
        if parsed.scheme() != "tcp" {
            return Err(TransportError::InvalidAddress(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::InvalidAddress("missing host".to_string()))?;
        let port = parsed
            .port()
            .ok_or_else(|| TransportError::InvalidAddress("missing port".to_string()))?;
        Ok(format!("{host}:{port}"))
    } else if target.contains(':') {
        Ok(target.to_string())
    } else {
        Err(TransportError::InvalidAddress(format!(
            "expected host:port, got '{target}'"
        )))
    }
}
