//! Generic connect/disconnect/reconnect state machine.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnectionConfig, ConnectionState, ReconnectPolicy};
use crate::error::TransportError;
use crate::seam::{Frame, Link, LinkHandler, Transport};

/// Callbacks the lifecycle surfaces to its adapter.
///
/// All callbacks run on the shared I/O runtime threads and must not block.
/// The lifecycle hands itself to `on_open` and `on_frame` so the adapter can
/// send without holding its own reference back into the state machine.
pub trait ConnectionEvents: Send + Sync {
    /// The transport accepted a dial and is about to connect.
    fn on_start(&self) {}

    /// The link reached `Connected`. A handshake message may be sent here.
    fn on_open(&self, conn: &ConnectionLifecycle) {
        let _ = conn;
    }

    /// An inbound frame arrived on the open link.
    fn on_frame(&self, conn: &ConnectionLifecycle, frame: Frame) {
        let _ = (conn, frame);
    }

    /// The link closed; the lifecycle has already settled its next state.
    fn on_close(&self, code: u16, reason: &str, remote: bool) {
        let _ = (code, reason, remote);
    }

    /// A transport error was observed.
    fn on_error(&self, error: &TransportError) {
        let _ = error;
    }
}

/// Exclusive, lock-guarded view of one adapter's connection.
struct ConnectionContext {
    state: ConnectionState,
    attempt: u32,
    /// Incremented on every dial; callbacks from older dials are stale.
    epoch: u64,
    link: Option<Arc<dyn Link>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Shared {
    name: String,
    config: ConnectionConfig,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    events: OnceLock<Arc<dyn ConnectionEvents>>,
    context: Mutex<ConnectionContext>,
}

/// Generic state machine governing one network link.
///
/// User calls (`connect`, `disconnect`, `send_text`) and I/O callbacks are
/// serialized through one context mutex, so a callback racing a user call
/// always resolves to a single consistent state.
#[derive(Clone)]
pub struct ConnectionLifecycle {
    shared: Arc<Shared>,
}

impl ConnectionLifecycle {
    /// Create a lifecycle for one adapter.
    pub fn new(
        name: impl Into<String>,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                policy,
                transport,
                runtime,
                events: OnceLock::new(),
                context: Mutex::new(ConnectionContext {
                    state: ConnectionState::Disconnected,
                    attempt: 0,
                    epoch: 0,
                    link: None,
                    reconnect_timer: None,
                }),
            }),
        }
    }

    /// Bind the adapter's event callbacks. Effective once; later calls are
    /// ignored with a warning.
    pub fn bind_events(&self, events: Arc<dyn ConnectionEvents>) {
        if self.shared.events.set(events).is_err() {
            warn!(name = %self.shared.name, "Connection events already bound");
        }
    }

    /// Adapter identity used in logs.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Connection options this lifecycle was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Current authoritative connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.context.lock().state
    }

    /// Reconnect attempts since the link was last up.
    pub fn attempt(&self) -> u32 {
        self.shared.context.lock().attempt
    }

    /// Check if the link is usable.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Start connecting. Allowed from `Disconnected` or `Reconnecting`;
    /// a no-op in any other state. Never waits for the network.
    pub fn connect(&self) {
        Shared::connect(&self.shared);
    }

    /// Close the link and settle to `Disconnected`, canceling any pending
    /// reconnect atomically with the transition. Never waits for the
    /// network.
    pub fn disconnect(&self) {
        let link = {
            let mut ctx = self.shared.context.lock();
            if ctx.state == ConnectionState::Disconnected {
                debug!(name = %self.shared.name, "Already disconnected");
                return;
            }

            if let Some(timer) = ctx.reconnect_timer.take() {
                timer.abort();
            }

            let link = ctx.link.take();
            // With no link open there is nothing to wait for.
            ctx.state = if link.is_some() {
                ConnectionState::Disconnecting
            } else {
                ConnectionState::Disconnected
            };
            ctx.attempt = 0;

            info!(name = %self.shared.name, state = ctx.state.name(), "Disconnect requested");
            link
        };

        if let Some(link) = link {
            link.close();
        }
    }

    /// Send a text frame if the link is `Connected`.
    ///
    /// Outside `Connected` the frame is silently dropped (sends may race a
    /// just-initiated disconnect). Returns whether the frame was handed to
    /// the link.
    pub fn send_text(&self, text: &str) -> bool {
        let link = {
            let ctx = self.shared.context.lock();
            if ctx.state != ConnectionState::Connected {
                trace!(name = %self.shared.name, state = ctx.state.name(), "Dropping send");
                return false;
            }
            ctx.link.clone()
        };

        match link {
            Some(link) => match link.send_text(text) {
                Ok(()) => true,
                Err(e) => {
                    debug!(name = %self.shared.name, error = %e, "Send failed");
                    false
                }
            },
            None => false,
        }
    }
}

impl Shared {
    fn connect(shared: &Arc<Self>) {
        let (handler, epoch) = {
            let mut ctx = shared.context.lock();
            match ctx.state {
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                    // A user-initiated connect may preempt the scheduled one.
                    if let Some(timer) = ctx.reconnect_timer.take() {
                        timer.abort();
                    }

                    ctx.state = ConnectionState::Connecting;
                    ctx.epoch += 1;

                    info!(
                        name = %shared.name,
                        address = %shared.config.server_address,
                        "Connecting"
                    );

                    let handler: Arc<dyn LinkHandler> = Arc::new(EpochHandler {
                        shared: Arc::downgrade(shared),
                        epoch: ctx.epoch,
                    });
                    (handler, ctx.epoch)
                }
                state => {
                    debug!(name = %shared.name, state = state.name(), "Connect ignored");
                    return;
                }
            }
        };

        trace!(name = %shared.name, epoch, "Dialing");
        shared.transport.open(
            &shared.config.server_address,
            shared.config.connect_timeout(),
            handler,
        );
    }

    fn events(&self) -> Option<Arc<dyn ConnectionEvents>> {
        self.events.get().cloned()
    }

    fn schedule_reconnect(shared: &Arc<Self>, ctx: &mut ConnectionContext) {
        let delay = shared.policy.delay_for_attempt(ctx.attempt);
        let weak = Arc::downgrade(shared);
        let epoch = ctx.epoch;

        info!(name = %shared.name, attempt = ctx.attempt, "Reconnecting in {:?}", delay);

        let timer = shared.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };

            let still_due = {
                let mut ctx = shared.context.lock();
                let due = ctx.state == ConnectionState::Reconnecting && ctx.epoch == epoch;
                if due {
                    ctx.reconnect_timer = None;
                }
                due
            };

            if still_due {
                Shared::connect(&shared);
            }
        });

        ctx.reconnect_timer = Some(timer);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let ctx = self.context.get_mut();
        if let Some(timer) = ctx.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(link) = ctx.link.take() {
            link.close();
        }
    }
}

/// Per-dial handler; `epoch` marks callbacks from superseded dials as stale.
struct EpochHandler {
    shared: Weak<Shared>,
    epoch: u64,
}

impl EpochHandler {
    fn shared(&self) -> Option<Arc<Shared>> {
        self.shared.upgrade()
    }

    fn is_current(&self, ctx: &ConnectionContext) -> bool {
        ctx.epoch == self.epoch
    }
}

impl LinkHandler for EpochHandler {
    fn on_start(&self) {
        if let Some(shared) = self.shared() {
            debug!(name = %shared.name, "Transport started");
            if let Some(events) = shared.events() {
                events.on_start();
            }
        }
    }

    fn on_open(&self, link: Arc<dyn Link>) {
        let Some(shared) = self.shared() else {
            link.close();
            return;
        };

        let adopted = {
            let mut ctx = shared.context.lock();
            if self.is_current(&ctx) && ctx.state == ConnectionState::Connecting {
                ctx.state = ConnectionState::Connected;
                ctx.attempt = 0;
                ctx.link = Some(link.clone());
                true
            } else {
                false
            }
        };

        if adopted {
            info!(name = %shared.name, "Connected");
            if let Some(events) = shared.events() {
                events.on_open(&ConnectionLifecycle {
                    shared: Arc::clone(&shared),
                });
            }
        } else {
            // A disconnect (or a newer dial) won the race; this link must
            // not survive it.
            debug!(name = %shared.name, "Discarding link from superseded dial");
            link.close();
        }
    }

    fn on_frame(&self, frame: Frame) {
        let Some(shared) = self.shared() else {
            return;
        };

        {
            let ctx = shared.context.lock();
            if !self.is_current(&ctx) {
                return;
            }
        }

        if let Some(events) = shared.events() {
            events.on_frame(
                &ConnectionLifecycle {
                    shared: Arc::clone(&shared),
                },
                frame,
            );
        }
    }

    fn on_close(&self, code: u16, reason: &str, remote: bool) {
        let Some(shared) = self.shared() else {
            return;
        };

        let settled = {
            let mut ctx = shared.context.lock();
            if !self.is_current(&ctx) {
                trace!(name = %shared.name, "Stale close ignored");
                return;
            }

            match ctx.state {
                ConnectionState::Disconnecting | ConnectionState::Reconnecting => {
                    ctx.state = ConnectionState::Disconnected;
                    ctx.link = None;
                    info!(name = %shared.name, code, reason, "Disconnected");
                    true
                }
                ConnectionState::Connecting | ConnectionState::Connected => {
                    // Link dropped or handshake failed; retry either way.
                    ctx.state = ConnectionState::Reconnecting;
                    ctx.link = None;
                    ctx.attempt += 1;
                    warn!(
                        name = %shared.name,
                        code,
                        reason,
                        remote,
                        "Connection lost, retrying"
                    );
                    Shared::schedule_reconnect(&shared, &mut ctx);
                    true
                }
                ConnectionState::Disconnected => false,
            }
        };

        if settled {
            if let Some(events) = shared.events() {
                events.on_close(code, reason, remote);
            }
        }
    }

    fn on_error(&self, error: &TransportError) {
        let Some(shared) = self.shared() else {
            return;
        };

        {
            let ctx = shared.context.lock();
            if !self.is_current(&ctx) {
                return;
            }
        }

        debug!(name = %shared.name, error = %error, "Transport error");
        if let Some(events) = shared.events() {
            events.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::runtime::Runtime;

    use crate::{CLOSE_ABNORMAL, CLOSE_NORMAL};

    struct FakeLink {
        closed: AtomicBool,
        sent: StdMutex<Vec<String>>,
    }

    impl FakeLink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                closed: AtomicBool::new(false),
                sent: StdMutex::new(Vec::new()),
            })
        }
    }

    impl Link for FakeLink {
        fn send_text(&self, text: &str) -> crate::TransportResult<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn send_binary(&self, _data: bytes::Bytes) -> crate::TransportResult<()> {
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Records handlers instead of dialing; tests drive the callbacks.
    #[derive(Default)]
    struct FakeTransport {
        handlers: StdMutex<Vec<Arc<dyn LinkHandler>>>,
    }

    impl FakeTransport {
        fn open_count(&self) -> usize {
            self.handlers.lock().unwrap().len()
        }

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
        _runtime: Runtime,
        transport: Arc<FakeTransport>,
        lifecycle: ConnectionLifecycle,
    }

    fn fixture(reconnect_delay_ms: u64) -> Fixture {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let transport = Arc::new(FakeTransport::default());
        let lifecycle = ConnectionLifecycle::new(
            "test",
            ConnectionConfig {
                server_address: "tcp://127.0.0.1:9".to_string(),
                connect_timeout_ms: 100,
                reconnect_delay_ms,
            },
            transport.clone(),
            runtime.handle().clone(),
        );
        Fixture {
            _runtime: runtime,
            transport,
            lifecycle,
        }
    }

    #[test]
    fn test_connect_reaches_connected_via_on_open() {
        let f = fixture(50);

        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);
        f.lifecycle.connect();
        assert_eq!(f.lifecycle.state(), ConnectionState::Connecting);

        f.transport.last_handler().on_open(FakeLink::new());
        assert_eq!(f.lifecycle.state(), ConnectionState::Connected);
        assert_eq!(f.lifecycle.attempt(), 0);
    }

    #[test]
    fn test_connect_is_ignored_while_connecting_or_connected() {
        let f = fixture(50);

        f.lifecycle.connect();
        f.lifecycle.connect();
        assert_eq!(f.transport.open_count(), 1);

        f.transport.last_handler().on_open(FakeLink::new());
        f.lifecycle.connect();
        assert_eq!(f.transport.open_count(), 1);
    }

    #[test]
    fn test_remote_drop_schedules_reconnect() {
        let f = fixture(50);

        f.lifecycle.connect();
        let handler = f.transport.last_handler();
        handler.on_open(FakeLink::new());
        handler.on_close(CLOSE_ABNORMAL, "abnormal", true);

        assert_eq!(f.lifecycle.state(), ConnectionState::Reconnecting);
        assert_eq!(f.lifecycle.attempt(), 1);

        // After the delay the lifecycle re-enters Connecting on its own.
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(f.lifecycle.state(), ConnectionState::Connecting);
        assert_eq!(f.transport.open_count(), 2);
    }

    #[test]
    fn test_failed_handshake_also_schedules_reconnect() {
        let f = fixture(50);

        f.lifecycle.connect();
        f.transport
            .last_handler()
            .on_close(CLOSE_ABNORMAL, "refused", true);

        assert_eq!(f.lifecycle.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn test_user_disconnect_settles_without_reconnect() {
        let f = fixture(50);

        f.lifecycle.connect();
        let handler = f.transport.last_handler();
        let link = FakeLink::new();
        handler.on_open(link.clone());

        f.lifecycle.disconnect();
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnecting);
        assert!(link.closed.load(Ordering::SeqCst));

        handler.on_close(CLOSE_NORMAL, "normal", false);
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);
        assert_eq!(f.transport.open_count(), 1);
    }

    #[test]
    fn test_disconnect_after_drop_cancels_pending_reconnect() {
        let f = fixture(100);

        f.lifecycle.connect();
        let handler = f.transport.last_handler();
        handler.on_open(FakeLink::new());
        handler.on_close(CLOSE_ABNORMAL, "lost", true);
        assert_eq!(f.lifecycle.state(), ConnectionState::Reconnecting);

        // Disconnect races the scheduled reconnect; no link is open, so the
        // state settles immediately and the timer must never fire.
        f.lifecycle.disconnect();
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);

        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);
        assert_eq!(f.transport.open_count(), 1);
    }

    #[test]
    fn test_disconnect_racing_close_never_ends_reconnecting() {
        let f = fixture(50);

        f.lifecycle.connect();
        let handler = f.transport.last_handler();
        let link = FakeLink::new();
        handler.on_open(link.clone());

        // Order: user disconnect first, then the dropped link's close lands.
        f.lifecycle.disconnect();
        handler.on_close(CLOSE_ABNORMAL, "lost", true);

        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);
        assert_eq!(f.transport.open_count(), 1);
    }

    #[test]
    fn test_late_open_after_disconnect_is_closed() {
        let f = fixture(50);

        f.lifecycle.connect();
        let handler = f.transport.last_handler();

        // Disconnect lands before the handshake completes.
        f.lifecycle.disconnect();
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);

        let link = FakeLink::new();
        handler.on_open(link.clone());
        assert!(link.closed.load(Ordering::SeqCst));
        assert_eq!(f.lifecycle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_suppressed_outside_connected() {
        let f = fixture(50);
        assert!(!f.lifecycle.send_text("early"));

        f.lifecycle.connect();
        assert!(!f.lifecycle.send_text("handshaking"));

        let link = FakeLink::new();
        f.transport.last_handler().on_open(link.clone());
        assert!(f.lifecycle.send_text("hello"));
        assert_eq!(link.sent.lock().unwrap().as_slice(), &["hello"]);

        f.lifecycle.disconnect();
        assert!(!f.lifecycle.send_text("late"));
        assert_eq!(link.sent.lock().unwrap().len(), 1);
    }

    struct RecordingEvents {
        opens: AtomicBool,
        closes: StdMutex<Vec<(u16, String, bool)>>,
        frames: StdMutex<Vec<String>>,
    }

    impl ConnectionEvents for RecordingEvents {
        fn on_open(&self, conn: &ConnectionLifecycle) {
            self.opens.store(true, Ordering::SeqCst);
            conn.send_text("handshake");
        }

        fn on_frame(&self, _conn: &ConnectionLifecycle, frame: Frame) {
            if let Frame::Text(text) = frame {
                self.frames.lock().unwrap().push(text);
            }
        }

        fn on_close(&self, code: u16, reason: &str, remote: bool) {
            self.closes
                .lock()
                .unwrap()
                .push((code, reason.to_string(), remote));
        }
    }

    #[test]
    fn test_events_forwarded_and_handshake_sent_on_open() {
        let f = fixture(50);
        let events = Arc::new(RecordingEvents {
            opens: AtomicBool::new(false),
            closes: StdMutex::new(Vec::new()),
            frames: StdMutex::new(Vec::new()),
        });
        f.lifecycle.bind_events(events.clone());

        f.lifecycle.connect();
        let handler = f.transport.last_handler();
        let link = FakeLink::new();
        handler.on_open(link.clone());

        assert!(events.opens.load(Ordering::SeqCst));
        assert_eq!(link.sent.lock().unwrap().as_slice(), &["handshake"]);

        handler.on_frame(Frame::Text("ping".to_string()));
        assert_eq!(events.frames.lock().unwrap().as_slice(), &["ping"]);

        handler.on_close(CLOSE_ABNORMAL, "lost", true);
        let closes = events.closes.lock().unwrap();
        assert_eq!(closes.as_slice(), &[(CLOSE_ABNORMAL, "lost".to_string(), true)]);
    }
}
