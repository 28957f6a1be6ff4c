//! Writer thread for durable state records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use streamhub_store::{PersistedRecord, PersistenceBackend};

use crate::retry::RetryPolicy;
use crate::WRITE_QUEUE_CAPACITY;

/// One pending durable write.
pub(crate) struct WriteRequest {
    pub key: String,
    pub payload: Bytes,
    pub written_at: DateTime<Utc>,
}

impl WriteRequest {
    pub fn new(key: &str, payload: Vec<u8>) -> Self {
        Self {
            key: key.to_string(),
            payload: Bytes::from(payload),
            written_at: Utc::now(),
        }
    }

    fn into_record(self) -> PersistedRecord {
        PersistedRecord {
            key: self.key,
            payload: self.payload,
            written_at: self.written_at,
        }
    }
}

/// Owns the writer thread draining the durable-write queue.
///
/// Store failures are retried with bounded backoff and then dropped; the
/// in-memory value stays authoritative either way.
pub(crate) struct StateWriter {
    tx: Sender<WriteRequest>,
    should_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StateWriter {
    pub fn spawn(backend: Arc<dyn PersistenceBackend>, policy: RetryPolicy) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(WRITE_QUEUE_CAPACITY);
        let should_stop = Arc::new(AtomicBool::new(false));

        let stop = Arc::clone(&should_stop);
        let thread = thread::spawn(move || writer_loop(rx, backend, policy, stop));

        Self {
            tx,
            should_stop,
            thread: Some(thread),
        }
    }

    /// A sender handle for channels that persist their pushes.
    pub fn sender(&self) -> Sender<WriteRequest> {
        self.tx.clone()
    }
}

impl Drop for StateWriter {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn writer_loop(
    rx: Receiver<WriteRequest>,
    backend: Arc<dyn PersistenceBackend>,
    policy: RetryPolicy,
    should_stop: Arc<AtomicBool>,
) {
    debug!("State writer started");

    while !should_stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(request) => write_with_retry(backend.as_ref(), &policy, request),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Flush whatever is still queued, one attempt each.
    while let Ok(request) = rx.try_recv() {
        let record = request.into_record();
        if let Err(e) = backend.store(&record) {
            warn!(key = %record.key, error = %e, "Dropping state write during shutdown");
        }
    }

    debug!("State writer exiting");
}

fn write_with_retry(backend: &dyn PersistenceBackend, policy: &RetryPolicy, request: WriteRequest) {
    let record = request.into_record();
    let mut attempt = 0u32;

    loop {
        match backend.store(&record) {
            Ok(()) => {
                trace!(key = %record.key, "Persisted state record");
                return;
            }
            Err(e) => {
                attempt += 1;
                if !policy.should_retry(attempt) {
                    warn!(
                        key = %record.key,
                        error = %e,
                        "Dropping state write after {} attempts",
                        attempt
                    );
                    return;
                }

                let delay = policy.delay_for_attempt(attempt);
                debug!(key = %record.key, error = %e, "State write failed, retrying in {:?}", delay);
                thread::sleep(delay);
            }
        }
    }
}
