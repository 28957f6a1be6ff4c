//! In-memory backend for transient runs and tests.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::backend::{PersistedRecord, PersistenceBackend};
use crate::StoreResult;

/// Backend that keeps records in a process-local map.
///
/// Nothing survives a restart; useful when no durable store is configured
/// and as the backend for tests.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, PersistedRecord>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the backend holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn store(&self, record: &PersistedRecord) -> StoreResult<()> {
        self.records
            .lock()
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> StoreResult<Option<PersistedRecord>> {
        Ok(self.records.lock().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_absent_key_is_none() {
        let backend = MemoryBackend::new();
        assert!(backend.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_store_overwrites_previous_record() {
        let backend = MemoryBackend::new();

        backend
            .store(&PersistedRecord::new("status", &b"first"[..]))
            .unwrap();
        backend
            .store(&PersistedRecord::new("status", &b"second"[..]))
            .unwrap();

        let loaded = backend.load("status").unwrap().unwrap();
        assert_eq!(&loaded.payload[..], b"second");
        assert_eq!(backend.len(), 1);
    }
}
