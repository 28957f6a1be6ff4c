//! Error types for the adapter module.

use thiserror::Error;

use streamhub_state::ConfigurationError;

/// Errors raised while decoding and dispatching one inbound message.
///
/// All of these discard a single message; none of them ends the connection.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Message was not valid JSON.
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Message carried no discriminator field.
    #[error("Message has no '{0}' field")]
    MissingDiscriminator(String),

    /// Discriminator value has no registered route.
    #[error("Unrecognized event '{0}'")]
    UnknownEvent(String),

    /// Message matched a route but its payload did not decode.
    #[error("Failed to decode '{event}': {source}")]
    Decode {
        event: String,
        source: serde_json::Error,
    },

    /// The state bus rejected the push.
    #[error(transparent)]
    State(#[from] ConfigurationError),
}
