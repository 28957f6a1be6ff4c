//! Error types for the storage module.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored record could not be interpreted.
    #[error("Corrupt record for key '{key}': {detail}")]
    Corrupt { key: String, detail: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
