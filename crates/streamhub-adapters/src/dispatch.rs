//! Decode-and-dispatch table for inbound messages.

use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use streamhub_state::{StateManager, StateValue};

use crate::error::AdapterError;
use crate::AdapterResult;

type DecodeFn = Box<dyn Fn(&StateManager, &str, Value) -> AdapterResult<()> + Send + Sync>;

struct Route {
    state_key: String,
    decode: DecodeFn,
}

/// Explicit mapping from event discriminator to state bus channel.
///
/// Built once at adapter construction; dispatch never inspects payload types
/// at runtime beyond the registered routes.
pub struct EventDispatcher {
    discriminator_field: String,
    routes: HashMap<String, Route>,
}

impl EventDispatcher {
    /// Create a dispatcher keyed on the given discriminator field.
    pub fn new(discriminator_field: impl Into<String>) -> Self {
        Self {
            discriminator_field: discriminator_field.into(),
            routes: HashMap::new(),
        }
    }

    /// Route messages whose discriminator equals `event` to `state_key`,
    /// decoded as `T`.
    pub fn route<T: StateValue>(mut self, event: &str, state_key: &str) -> Self {
        let event_name = event.to_string();
        self.routes.insert(
            event.to_string(),
            Route {
                state_key: state_key.to_string(),
                decode: Box::new(move |states, state_key, payload| {
                    let value: T =
                        serde_json::from_value(payload).map_err(|source| AdapterError::Decode {
                            event: event_name.clone(),
                            source,
                        })?;
                    states.push(state_key, value)?;
                    Ok(())
                }),
            },
        );
        self
    }

    /// Events this dispatcher recognizes.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Decode one raw message and push it to its mapped channel.
    pub fn dispatch(&self, states: &StateManager, raw: &str) -> AdapterResult<()> {
        let payload: Value = serde_json::from_str(raw)?;

        let event = payload
            .get(self.discriminator_field.as_str())
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::MissingDiscriminator(self.discriminator_field.clone()))?
            .to_string();

        let route = self
            .routes
            .get(&event)
            .ok_or(AdapterError::UnknownEvent(event))?;

        trace!(state_key = %route.state_key, "Dispatching event");
        (route.decode)(states, &route.state_key, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use streamhub_state::{Persistence, StateManager};
    use streamhub_store::MemoryBackend;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tick {
        count: u32,
    }

    fn states() -> StateManager {
        let states = StateManager::new(Arc::new(MemoryBackend::new()));
        states
            .register_or_get::<Tick>("ticks", Persistence::Transient)
            .unwrap();
        states
    }

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new("type").route::<Tick>("tick", "ticks")
    }

    #[test]
    fn test_dispatch_pushes_decoded_value() {
        let states = states();
        dispatcher()
            .dispatch(&states, r#"{"type":"tick","count":3}"#)
            .unwrap();

        assert_eq!(
            states.current::<Tick>("ticks").unwrap(),
            Some(Tick { count: 3 })
        );
    }

    #[test]
    fn test_unknown_event_is_reported_and_processing_continues() {
        let states = states();
        let dispatcher = dispatcher();

        match dispatcher.dispatch(&states, r#"{"type":"mystery"}"#) {
            Err(AdapterError::UnknownEvent(event)) => assert_eq!(event, "mystery"),
            other => panic!("expected unknown event, got {other:?}"),
        }

        // The bad message must not poison the dispatcher.
        dispatcher
            .dispatch(&states, r#"{"type":"tick","count":1}"#)
            .unwrap();
        assert_eq!(
            states.current::<Tick>("ticks").unwrap(),
            Some(Tick { count: 1 })
        );
    }

    #[test]
    fn test_malformed_payload_is_reported() {
        let states = states();
        assert!(matches!(
            dispatcher().dispatch(&states, "not json"),
            Err(AdapterError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_missing_discriminator_is_reported() {
        let states = states();
        assert!(matches!(
            dispatcher().dispatch(&states, r#"{"count":1}"#),
            Err(AdapterError::MissingDiscriminator(field)) if field == "type"
        ));
    }

    #[test]
    fn test_decode_failure_is_reported() {
        let states = states();
        match dispatcher().dispatch(&states, r#"{"type":"tick","count":"three"}"#) {
            Err(AdapterError::Decode { event, .. }) => assert_eq!(event, "tick"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
