//! StreamHub control daemon.
//!
//! Composition root for the hub: builds the persistence backend, the state
//! manager, the shared I/O runtime and transport, then each configured
//! adapter, in that order. Teardown runs through explicit shutdown hooks in
//! reverse order.

mod config;
mod observer;
mod shutdown;

use std::sync::Arc;

use tracing::info;

use streamhub_adapters::{PlayerAdapter, SwitcherAdapter};
use streamhub_state::StateManager;
use streamhub_store::{MemoryBackend, PersistenceBackend, SqliteBackend};
use streamhub_transport::TcpTransport;

use crate::config::AppConfig;
use crate::observer::StateObserver;
use crate::shutdown::ShutdownHooks;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting StreamHub");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path)?,
        None => {
            info!("No config file given, using defaults (all adapters disabled)");
            AppConfig::default()
        }
    };

    let backend: Arc<dyn PersistenceBackend> = match &config.state_db {
        Some(path) => {
            info!(path = %path.display(), "Using durable state store");
            Arc::new(SqliteBackend::open(path)?)
        }
        None => {
            info!("No state database configured, persistent channels will not survive restarts");
            Arc::new(MemoryBackend::new())
        }
    };

    let states = Arc::new(StateManager::new(backend));

    // Shared I/O pool for every adapter's network tasks and timers.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let transport = Arc::new(TcpTransport::new(runtime.handle().clone()));

    let mut hooks = ShutdownHooks::new();
    let mut observer = StateObserver::new();

    let switcher = if config.switcher.enabled {
        let adapter = SwitcherAdapter::new(
            states.clone(),
            config.switcher.connection(),
            transport.clone(),
            runtime.handle().clone(),
        )?;
        observer.watch_switcher(&states)?;
        Some(adapter)
    } else {
        None
    };

    let player = if config.player.enabled {
        let adapter = PlayerAdapter::new(
            states.clone(),
            config.player.connection(),
            transport.clone(),
            runtime.handle().clone(),
        )?;
        observer.watch_player(&states)?;
        Some(adapter)
    } else {
        None
    };

    // Hooks run in reverse order: adapters hang up before the observer lets
    // go of its subscriptions.
    hooks.push("observer", move || observer.cancel_all());

    if let Some(adapter) = switcher {
        adapter.connect();
        hooks.push("switcher", move || adapter.disconnect());
    }

    if let Some(adapter) = player {
        adapter.connect();
        hooks.push("player", move || adapter.disconnect());
    }

    info!("Started");
    runtime.block_on(tokio::signal::ctrl_c())?;

    info!("Shutdown requested");
    hooks.run();

    Ok(())
}
