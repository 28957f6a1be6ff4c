//! Console observer for hub state.
//!
//! Stands in for the external consumers (overlay server, automation scripts)
//! that subscribe to the bus in a full deployment: it watches every channel
//! the configured adapters publish and logs the changes.

use tracing::info;

use streamhub_adapters::{
    PlayerSong, PlayerStatus, SwitcherHeartbeat, SwitcherStreamStatus, PLAYER_SONG_KEY,
    PLAYER_STATUS_KEY, SWITCHER_HEARTBEAT_KEY, SWITCHER_STREAM_STATUS_KEY,
};
use streamhub_state::{StateManager, StateResult, Subscription};

/// Holds the observer's live subscriptions.
#[derive(Default)]
pub struct StateObserver {
    subscriptions: Vec<Subscription>,
}

impl StateObserver {
    /// Create an observer with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch the switcher channels.
    pub fn watch_switcher(&mut self, states: &StateManager) -> StateResult<()> {
        self.subscriptions.push(states.subscribe(
            SWITCHER_HEARTBEAT_KEY,
            |heartbeat: &SwitcherHeartbeat| {
                info!(
                    streaming = heartbeat.streaming,
                    cpu = heartbeat.cpu_usage,
                    "Switcher heartbeat"
                );
            },
        )?);
        self.subscriptions.push(states.subscribe(
            SWITCHER_STREAM_STATUS_KEY,
            |status: &SwitcherStreamStatus| {
                info!(
                    streaming = status.streaming,
                    fps = status.fps,
                    dropped = status.num_dropped_frames,
                    "Stream status"
                );
            },
        )?);
        Ok(())
    }

    /// Watch the player channels.
    pub fn watch_player(&mut self, states: &StateManager) -> StateResult<()> {
        self.subscriptions
            .push(states.subscribe(PLAYER_SONG_KEY, |song: &PlayerSong| {
                info!(title = %song.title, artist = %song.artist, "Now playing");
            })?);
        self.subscriptions
            .push(states.subscribe(PLAYER_STATUS_KEY, |status: &PlayerStatus| {
                info!(state = %status.state, volume = status.volume, "Player status");
            })?);
        Ok(())
    }

    /// Cancel every subscription.
    pub fn cancel_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
    }
}
