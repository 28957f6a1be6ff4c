//! Error types for the state bus.

use thiserror::Error;

use crate::channel::Persistence;

/// Programming errors surfaced immediately to the caller.
///
/// These are never retried; they abort only the operation that caused them.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Push or subscribe against a key nobody registered.
    #[error("State key '{0}' is not registered")]
    UnknownKey(String),

    /// Re-registration with a conflicting persistence mode.
    #[error("State key '{key}' is registered as {registered}, requested {requested}")]
    PersistenceModeMismatch {
        key: String,
        registered: Persistence,
        requested: Persistence,
    },

    /// Access with a value type other than the one registered for the key.
    #[error("State key '{key}' holds values of type {registered}, requested {requested}")]
    TypeMismatch {
        key: String,
        registered: &'static str,
        requested: &'static str,
    },
}
