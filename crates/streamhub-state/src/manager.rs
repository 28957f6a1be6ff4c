//! Channel registry and the single entry point to the state bus.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use streamhub_store::PersistenceBackend;

use crate::channel::{Persistence, StateChannel, StateValue, Subscription};
use crate::error::ConfigurationError;
use crate::retry::RetryPolicy;
use crate::writer::StateWriter;
use crate::StateResult;

struct Registered {
    persistence: Persistence,
    type_name: &'static str,
    channel: Arc<dyn Any + Send + Sync>,
}

/// Registry of state channels; adapters publish through it, consumers
/// observe through it.
///
/// The registry map is guarded for concurrent insert/lookup; each channel
/// guards its own value and subscriber set, so unrelated channels never
/// contend.
pub struct StateManager {
    channels: RwLock<HashMap<String, Registered>>,
    backend: Arc<dyn PersistenceBackend>,
    writer: StateWriter,
}

impl StateManager {
    /// Create a manager over the given backend.
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self::with_retry_policy(backend, RetryPolicy::default())
    }

    /// Create a manager with a custom durable-write retry policy.
    pub fn with_retry_policy(backend: Arc<dyn PersistenceBackend>, policy: RetryPolicy) -> Self {
        let writer = StateWriter::spawn(Arc::clone(&backend), policy);
        Self {
            channels: RwLock::new(HashMap::new()),
            backend,
            writer,
        }
    }

    /// Register a channel for `key`, or return the existing one.
    ///
    /// Idempotent: the persistence mode and value type are fixed by the
    /// first registration and later calls must match them. A persistent
    /// channel is seeded from the backend on first registration.
    pub fn register_or_get<T: StateValue>(
        &self,
        key: &str,
        persistence: Persistence,
    ) -> StateResult<Arc<StateChannel<T>>> {
        {
            let channels = self.channels.read();
            if let Some(registered) = channels.get(key) {
                return checked::<T>(key, registered, Some(persistence));
            }
        }

        let mut channels = self.channels.write();
        if let Some(registered) = channels.get(key) {
            return checked::<T>(key, registered, Some(persistence));
        }

        let seed = match persistence {
            Persistence::Persistent => self.load_seed::<T>(key),
            Persistence::Transient => None,
        };
        let write_tx = match persistence {
            Persistence::Persistent => Some(self.writer.sender()),
            Persistence::Transient => None,
        };

        let channel = Arc::new(StateChannel::new(
            key.to_string(),
            persistence,
            seed,
            write_tx,
        ));
        channels.insert(
            key.to_string(),
            Registered {
                persistence,
                type_name: type_name::<T>(),
                channel: channel.clone() as Arc<dyn Any + Send + Sync>,
            },
        );

        info!(key, mode = persistence.name(), "Registered state channel");
        Ok(channel)
    }

    /// Push a value to a registered channel.
    pub fn push<T: StateValue>(&self, key: &str, value: T) -> StateResult<()> {
        self.channel::<T>(key)?.push(value);
        Ok(())
    }

    /// Subscribe a callback to a registered channel.
    pub fn subscribe<T: StateValue>(
        &self,
        key: &str,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> StateResult<Subscription> {
        Ok(self.channel::<T>(key)?.subscribe(callback))
    }

    /// Snapshot of the latest value on a registered channel.
    pub fn current<T: StateValue>(&self, key: &str) -> StateResult<Option<T>> {
        Ok(self.channel::<T>(key)?.current())
    }

    /// Whether a channel is registered for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.channels.read().contains_key(key)
    }

    /// Typed handle to an already-registered channel.
    pub fn channel<T: StateValue>(&self, key: &str) -> StateResult<Arc<StateChannel<T>>> {
        let channels = self.channels.read();
        let registered = channels
            .get(key)
            .ok_or_else(|| ConfigurationError::UnknownKey(key.to_string()))?;
        checked::<T>(key, registered, None)
    }

    fn load_seed<T: StateValue>(&self, key: &str) -> Option<T> {
        match self.backend.load(key) {
            Ok(Some(record)) => match serde_json::from_slice(&record.payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "Failed to decode persisted state, starting empty");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to load persisted state, starting empty");
                None
            }
        }
    }
}

fn checked<T: StateValue>(
    key: &str,
    registered: &Registered,
    requested_mode: Option<Persistence>,
) -> StateResult<Arc<StateChannel<T>>> {
    if let Some(requested) = requested_mode {
        if registered.persistence != requested {
            return Err(ConfigurationError::PersistenceModeMismatch {
                key: key.to_string(),
                registered: registered.persistence,
                requested,
            });
        }
    }

    registered
        .channel
        .clone()
        .downcast::<StateChannel<T>>()
        .map_err(|_| ConfigurationError::TypeMismatch {
            key: key.to_string(),
            registered: registered.type_name,
            requested: type_name::<T>(),
        })
}
