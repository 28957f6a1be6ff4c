//! Typed state/event bus shared by all hub adapters.
//!
//! Every external tool pushes its decoded events into per-key channels owned
//! by the [`StateManager`]; consumers subscribe to those channels without
//! ever touching an adapter or a socket. Channels registered as persistent
//! write their latest value through a [`streamhub_store::PersistenceBackend`]
//! on a dedicated writer thread.

mod channel;
mod error;
mod manager;
mod retry;
mod writer;

pub use channel::{Persistence, StateChannel, StateValue, Subscription};
pub use error::ConfigurationError;
pub use manager::StateManager;
pub use retry::RetryPolicy;

/// Capacity of the durable-write queue.
pub const WRITE_QUEUE_CAPACITY: usize = 256;

/// Maximum attempts for one durable write.
pub const MAX_STORE_ATTEMPTS: u32 = 3;

/// Base retry delay for failed durable writes, in milliseconds.
pub const BASE_STORE_RETRY_DELAY_MS: u64 = 100;

/// Result type for state bus operations.
pub type StateResult<T> = Result<T, ConfigurationError>;
