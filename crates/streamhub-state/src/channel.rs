//! Per-key state channels and subscription handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::writer::WriteRequest;

/// Persistence mode of a channel, fixed at first registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Latest value lives in memory only.
    Transient,

    /// Latest value is also written through the persistence backend.
    Persistent,
}

impl Persistence {
    /// Returns a simple string representation of the mode.
    pub fn name(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Persistent => "persistent",
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values that can travel through a state channel.
pub trait StateValue:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

impl<T> StateValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

struct Subscriber<T> {
    id: u64,
    callback: Box<dyn Fn(&T) + Send + Sync>,
    cancelled: Arc<AtomicBool>,
}

struct ChannelInner<T> {
    current: Option<T>,
    subscribers: Vec<Subscriber<T>>,
}

/// Single typed slot holding the latest value for one state key.
///
/// All mutations of the slot and its subscriber set go through one lock, so
/// pushes are totally ordered per channel and every subscriber observes the
/// same order.
pub struct StateChannel<T: StateValue> {
    key: String,
    persistence: Persistence,
    inner: Mutex<ChannelInner<T>>,
    next_id: AtomicU64,
    write_tx: Option<Sender<WriteRequest>>,
}

impl<T: StateValue> fmt::Debug for StateChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChannel")
            .field("key", &self.key)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl<T: StateValue> StateChannel<T> {
    pub(crate) fn new(
        key: String,
        persistence: Persistence,
        seed: Option<T>,
        write_tx: Option<Sender<WriteRequest>>,
    ) -> Self {
        Self {
            key,
            persistence,
            inner: Mutex::new(ChannelInner {
                current: seed,
                subscribers: Vec::new(),
            }),
            next_id: AtomicU64::new(0),
            write_tx,
        }
    }

    /// The state key this channel holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The persistence mode fixed at registration.
    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Snapshot of the latest value, if any.
    pub fn current(&self) -> Option<T> {
        self.inner.lock().current.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Set the latest value and deliver it to every active subscriber.
    ///
    /// Delivery runs on the calling thread under the channel lock; the
    /// durable write (for persistent channels) is handed to the writer
    /// thread afterwards and can never fail the pusher.
    pub fn push(&self, value: T) {
        {
            let mut inner = self.inner.lock();
            inner.current = Some(value.clone());

            for subscriber in &inner.subscribers {
                if !subscriber.cancelled.load(Ordering::SeqCst) {
                    (subscriber.callback)(&value);
                }
            }
        }

        self.enqueue_write(&value);
    }

    /// Register a callback for this channel.
    ///
    /// If the channel already has a current value the callback receives it
    /// once, immediately, before any subsequent push. Callbacks run on the
    /// pushing thread and must not block or call back into the same channel.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));

        {
            let mut inner = self.inner.lock();
            if let Some(current) = &inner.current {
                callback(current);
            }
            inner.subscribers.push(Subscriber {
                id,
                callback: Box::new(callback),
                cancelled: Arc::clone(&cancelled),
            });
        }

        trace!(key = %self.key, id, "Subscription created");

        let channel: Weak<Self> = Arc::downgrade(self);
        Subscription {
            cancelled,
            detach: Box::new(move || {
                if let Some(channel) = channel.upgrade() {
                    channel.remove_subscriber(id);
                }
            }),
        }
    }

    fn remove_subscriber(&self, id: u64) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| s.id != id);
    }

    fn enqueue_write(&self, value: &T) {
        let Some(write_tx) = &self.write_tx else {
            return;
        };

        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to serialize state value, skipping durable write");
                return;
            }
        };

        match write_tx.try_send(WriteRequest::new(&self.key, payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(key = %self.key, "Durable write queue full, dropping write");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(key = %self.key, "State writer stopped, dropping write");
            }
        }
    }
}

/// Handle returned by `subscribe`.
///
/// Holds only a weak reference back to its channel, so an outstanding handle
/// never keeps a channel alive beyond the manager's lifetime.
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    detach: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Cancel the subscription.
    ///
    /// Synchronous with respect to future deliveries: once this returns the
    /// callback will not be invoked again. A delivery already executing on
    /// another thread is allowed to complete.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        (self.detach)();
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
