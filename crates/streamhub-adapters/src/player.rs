//! Music-player daemon adapter.
//!
//! The player daemon announces track changes and playback state. The current
//! song is kept on a persistent channel so overlays show the last played
//! track as soon as the hub restarts, even before the daemon reconnects.

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

/// State key for the currently playing song.
pub const PLAYER_SONG_KEY: &str = "player.song";

/// State key for the playback status.
pub const PLAYER_STATUS_KEY: &str = "player.status";

/// Track metadata announced on song change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSong {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub artist: String,

    #[serde(default)]
    pub album: String,
}

/// Playback state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    /// One of "play", "pause", "stop".
    pub state: String,

    #[serde(default)]
    pub volume: u32,

    /// Position in the current track, in seconds.
    #[serde(default)]
    pub elapsed: u64,

    /// Length of the current track, in seconds.
    #[serde(default)]
    pub duration: u64,
}

/// Adapter for the music-player daemon.
pub struct PlayerAdapter {
    lifecycle: ConnectionLifecycle,
}

impl PlayerAdapter {
    /// Register the player channels and build the adapter.
    pub fn new(
        states: Arc<StateManager>,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        runtime: tokio::runtime::Handle,
    ) -> StateResult<Self> {
        states.register_or_get::<PlayerSong>(PLAYER_SONG_KEY, Persistence::Persistent)?;
        states.register_or_get::<PlayerStatus>(PLAYER_STATUS_KEY, Persistence::Transient)?;

        let dispatcher = EventDispatcher::new("type")
            .route::<PlayerSong>("song_change", PLAYER_SONG_KEY)
            .route::<PlayerStatus>("state", PLAYER_STATUS_KEY);

        let lifecycle = ConnectionLifecycle::new("player", config, transport, runtime);
        lifecycle.bind_events(Arc::new(PlayerEvents { states, dispatcher }));

        Ok(Self { lifecycle })
    }

    /// Start connecting to the player daemon.
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

struct PlayerEvents {
    states: Arc<StateManager>,
    dispatcher: EventDispatcher,
}

impl ConnectionEvents for PlayerEvents {
    fn on_open(&self, conn: &ConnectionLifecycle) {
        // Request an immediate snapshot; updates then arrive on their own.
        if conn.send_text(&json!({"type": "status"}).to_string()) {
            debug!("Requested player status");
        }
    }

    fn on_frame(&self, _conn: &ConnectionLifecycle, frame: Frame) {
        let Frame::Text(text) = frame else {
            trace!("Ignoring binary frame from player");
            return;
        };

        match self.dispatcher.dispatch(&self.states, &text) {
            Ok(()) => {}
            Err(AdapterError::UnknownEvent(event)) => {
                debug!(event, "Ignoring unrecognized player event");
            }
            Err(e) => warn!(error = %e, "Discarding player message"),
        }
    }
}
