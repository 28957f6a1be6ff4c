//! Video switcher adapter.
//!
//! Bridges the video-switching application's event feed onto the state bus.
//! The switcher pushes a periodic heartbeat and a stream status update; both
//! land on transient channels since they are refreshed every few seconds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace, warn};

use streamhub_state::{Persistence, StateManager, StateResult};
use streamhub_transport::{
    ConnectionConfig, ConnectionEvents, ConnectionLifecycle, ConnectionState, Frame, Transport,
};

use crate::dispatch::EventDispatcher;
use crate::error::AdapterError;

/// State key for the switcher heartbeat.
pub const SWITCHER_HEARTBEAT_KEY: &str = "switcher.heartbeat";

/// State key for the switcher stream status.
pub const SWITCHER_STREAM_STATUS_KEY: &str = "switcher.stream-status";

/// Periodic liveness report from the switcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SwitcherHeartbeat {
    pub pulse: bool,

    #[serde(default)]
    pub streaming: bool,

    #[serde(default)]
    pub recording: bool,

    #[serde(default)]
    pub cpu_usage: f64,

    #[serde(default)]
    pub kbits_per_sec: u32,

    /// Seconds since the current stream started.
    #[serde(default)]
    pub total_stream_time: u64,
}

/// Stream health snapshot emitted while the switcher is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SwitcherStreamStatus {
    pub streaming: bool,

    pub recording: bool,

    #[serde(default)]
    pub fps: f64,

    #[serde(default)]
    pub kbits_per_sec: u32,

    #[serde(default)]
    pub num_dropped_frames: u64,

    #[serde(default)]
    pub num_total_frames: u64,

    /// Seconds since the current stream started.
    #[serde(default)]
    pub total_stream_time: u64,
}

/// Adapter for the video switcher.
pub struct SwitcherAdapter {
    lifecycle: ConnectionLifecycle,
}

impl SwitcherAdapter {
    /// Register the switcher channels and build the adapter.
    pub fn new(
        states: Arc<StateManager>,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        runtime: tokio::runtime::Handle,
    ) -> StateResult<Self> {
        states.register_or_get::<SwitcherHeartbeat>(SWITCHER_HEARTBEAT_KEY, Persistence::Transient)?;
        states.register_or_get::<SwitcherStreamStatus>(
            SWITCHER_STREAM_STATUS_KEY,
            Persistence::Transient,
        )?;

        let dispatcher = EventDispatcher::new("update-type")
            .route::<SwitcherHeartbeat>("Heartbeat", SWITCHER_HEARTBEAT_KEY)
            .route::<SwitcherStreamStatus>("StreamStatus", SWITCHER_STREAM_STATUS_KEY);

        let lifecycle = ConnectionLifecycle::new("switcher", config, transport, runtime);
        lifecycle.bind_events(Arc::new(SwitcherEvents { states, dispatcher }));

        Ok(Self { lifecycle })
    }

    /// Start connecting to the switcher.
    pub fn connect(&self) {
        self.lifecycle.connect();
    }

    /// Close the link and stop reconnecting.
    pub fn disconnect(&self) {
        self.lifecycle.disconnect();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }
}

struct SwitcherEvents {
    states: Arc<StateManager>,
    dispatcher: EventDispatcher,
}

impl ConnectionEvents for SwitcherEvents {
    fn on_open(&self, conn: &ConnectionLifecycle) {
        // Ask the switcher to start pulsing before normal traffic begins.
        let handshake = json!({
            "request-type": "SetHeartbeat",
            "enable": true,
            "message-id": "1",
        });
        if conn.send_text(&handshake.to_string()) {
            debug!("Requested switcher heartbeat");
        }
    }

    fn on_frame(&self, _conn: &ConnectionLifecycle, frame: Frame) {
        let Frame::Text(text) = frame else {
            trace!("Ignoring binary frame from switcher");
            return;
        };

        match self.dispatcher.dispatch(&self.states, &text) {
            Ok(()) => {}
            Err(AdapterError::UnknownEvent(event)) => {
                debug!(event, "Ignoring unrecognized switcher event");
            }
            Err(e) => warn!(error = %e, "Discarding switcher message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use streamhub_store::MemoryBackend;
    use streamhub_transport::{Link, LinkHandler, TransportResult, CLOSE_ABNORMAL};

    struct FakeLink {
        closed: AtomicBool,
        sent: Mutex<Vec<String>>,
    }

    impl FakeLink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                closed: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl Link for FakeLink {
        fn send_text(&self, text: &str) -> TransportResult<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn send_binary(&self, _data: bytes::Bytes) -> TransportResult<()> {
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        handlers: Mutex<Vec<Arc<dyn LinkHandler>>>,
    }

    impl FakeTransport {
        fn last_handler(&self) -> Arc<dyn LinkHandler> {
            self.handlers.lock().unwrap().last().unwrap().clone()
        }
    }

    impl Transport for FakeTransport {
        fn open(&self, _target: &str, _timeout: Duration, handler: Arc<dyn LinkHandler>) {
            handler.on_start();
            self.handlers.lock().unwrap().push(handler);
        }
    }

    struct Fixture {
        _runtime: tokio::runtime::Runtime,
        states: Arc<StateManager>,
        transport: Arc<FakeTransport>,
        adapter: SwitcherAdapter,
    }

    fn fixture() -> Fixture {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let states = Arc::new(StateManager::new(Arc::new(MemoryBackend::new())));
        let transport = Arc::new(FakeTransport::default());
        let adapter = SwitcherAdapter::new(
            states.clone(),
            ConnectionConfig {
                server_address: "tcp://127.0.0.1:4444".to_string(),
                connect_timeout_ms: 100,
                reconnect_delay_ms: 50,
            },
            transport.clone(),
            runtime.handle().clone(),
        )
        .unwrap();

        Fixture {
            _runtime: runtime,
            states,
            transport,
            adapter,
        }
    }

    #[test]
    fn test_handshake_sent_on_open() {
        let f = fixture();
        f.adapter.connect();

        let link = FakeLink::new();
        f.transport.last_handler().on_open(link.clone());

        assert_eq!(f.adapter.state(), ConnectionState::Connected);
        let sent = link.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let handshake: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(handshake["request-type"], "SetHeartbeat");
        assert_eq!(handshake["enable"], true);
    }

    #[test]
    fn test_heartbeat_lands_on_channel() {
        let f = fixture();
        f.adapter.connect();

        let handler = f.transport.last_handler();
        handler.on_open(FakeLink::new());
        handler.on_frame(Frame::Text(
            r#"{"update-type":"Heartbeat","pulse":true,"cpu-usage":12.5,"kbits-per-sec":2500}"#
                .to_string(),
        ));

        let heartbeat = f
            .states
            .current::<SwitcherHeartbeat>(SWITCHER_HEARTBEAT_KEY)
            .unwrap()
            .expect("heartbeat pushed");
        assert!(heartbeat.pulse);
        assert_eq!(heartbeat.cpu_usage, 12.5);
        assert_eq!(heartbeat.kbits_per_sec, 2500);
    }

    #[test]
    fn test_unknown_event_does_not_break_the_feed() {
        let f = fixture();
        f.adapter.connect();

        let handler = f.transport.last_handler();
        handler.on_open(FakeLink::new());
        handler.on_frame(Frame::Text(
            r#"{"update-type":"SceneSwitched","scene-name":"intro"}"#.to_string(),
        ));
        handler.on_frame(Frame::Text("garbage".to_string()));
        handler.on_frame(Frame::Text(
            r#"{"update-type":"StreamStatus","streaming":true,"recording":false,"fps":60.0}"#
                .to_string(),
        ));

        let status = f
            .states
            .current::<SwitcherStreamStatus>(SWITCHER_STREAM_STATUS_KEY)
            .unwrap()
            .expect("status pushed");
        assert!(status.streaming);
        assert_eq!(status.fps, 60.0);
    }

    #[test]
    fn test_lost_link_reconnects_and_resumes_dispatch() {
        let f = fixture();
        f.adapter.connect();

        let handler = f.transport.last_handler();
        handler.on_open(FakeLink::new());
        handler.on_close(CLOSE_ABNORMAL, "lost", true);
        assert_eq!(f.adapter.state(), ConnectionState::Reconnecting);

        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(f.adapter.state(), ConnectionState::Connecting);

        let handler = f.transport.last_handler();
        handler.on_open(FakeLink::new());
        handler.on_frame(Frame::Text(
            r#"{"update-type":"Heartbeat","pulse":false}"#.to_string(),
        ));

        let heartbeat = f
            .states
            .current::<SwitcherHeartbeat>(SWITCHER_HEARTBEAT_KEY)
            .unwrap()
            .expect("heartbeat pushed after reconnect");
        assert!(!heartbeat.pulse);
    }
}
