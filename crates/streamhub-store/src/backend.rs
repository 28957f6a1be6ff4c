//! Backend abstraction for persisted state records.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::StoreResult;

/// One persisted state record. Overwritten on every write to its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    /// State key the record belongs to.
    pub key: String,

    /// Serialized payload.
    pub payload: Bytes,

    /// Wall-clock time of the write.
    pub written_at: DateTime<Utc>,
}

impl PersistedRecord {
    /// Create a record stamped with the current time.
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            written_at: Utc::now(),
        }
    }
}

/// Durable key/value store used by persistent channels.
///
/// `load` returning `Ok(None)` means the key has never been written;
/// absence is not an error.
pub trait PersistenceBackend: Send + Sync {
    /// Write a record, replacing any previous record for the same key.
    fn store(&self, record: &PersistedRecord) -> StoreResult<()>;

    /// Read the latest record for a key, if any.
    fn load(&self, key: &str) -> StoreResult<Option<PersistedRecord>>;
}
