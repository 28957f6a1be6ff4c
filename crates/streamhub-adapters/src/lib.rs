//! Protocol adapters bridging external tools onto the state bus.
//!
//! Each adapter owns one [`streamhub_transport::ConnectionLifecycle`] and a
//! decode-and-dispatch table mapping inbound event discriminators to state
//! bus channels. Consumers only ever see the channels; adapters never expose
//! their sockets.

mod dispatch;
mod error;
mod player;
mod switcher;

pub use dispatch::EventDispatcher;
pub use error::AdapterError;
pub use player::{PlayerAdapter, PlayerSong, PlayerStatus, PLAYER_SONG_KEY, PLAYER_STATUS_KEY};
pub use switcher::{
    SwitcherAdapter, SwitcherHeartbeat, SwitcherStreamStatus, SWITCHER_HEARTBEAT_KEY,
    SWITCHER_STREAM_STATUS_KEY,
};

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
