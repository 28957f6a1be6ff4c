//! Durable key/value backends for persistent hub state.
//!
//! Channels marked persistent write their latest value through a
//! [`PersistenceBackend`]; one record per state key, last write wins.

mod backend;
mod error;
mod memory;
mod sqlite;

pub use backend::{PersistedRecord, PersistenceBackend};
pub use error::StorageError;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StorageError>;
