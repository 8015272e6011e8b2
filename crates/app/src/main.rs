mod api;
mod runtime;

use crate::runtime::{run_engine_task, start_dispatch_task, start_tick_task};
use anyhow::Context;
use axum::serve;
use pester_core::config::TriggerConfig;
use pester_core::engine::TriggerEngine;
use pester_core::events::Event;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tracing::{error, info, warn};

#[derive(Debug)]
struct Config {
    port: u16,
    trigger_config: Option<PathBuf>,
    seed: Option<u64>,
}

impl Config {
    fn from_env() -> Self {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid PORT {:?}, using 3000", raw);
                3000
            }),
            Err(_) => 3000,
        };
        let seed = std::env::var("PESTER_SEED")
            .ok()
            .and_then(|raw| match raw.parse() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    warn!("Invalid PESTER_SEED {:?}, using a random seed", raw);
                    None
                }
            });
        let trigger_config = std::env::var_os("PESTER_CONFIG").map(PathBuf::from);
        Self {
            port,
            trigger_config,
            seed,
        }
    }

    fn load_triggers(&self) -> anyhow::Result<TriggerConfig> {
        match &self.trigger_config {
            Some(path) => TriggerConfig::load(path)
                .with_context(|| format!("loading trigger config {}", path.display())),
            None => {
                info!("PESTER_CONFIG not set, using default triggers");
                Ok(TriggerConfig::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup tracing with timestamped logs
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!("Starting...");

    let config = Config::from_env();
    let triggers = config.load_triggers()?;
    let period = Duration::from_millis(triggers.delay_ms);
    info!(
        "Pack {} (mood {}), tick every {}ms, single_mode={}",
        triggers.pack_name, triggers.mood, triggers.delay_ms, triggers.single_mode
    );

    // Build a throwaway engine up front so a bad config fails before any task starts
    let initial_snapshot = TriggerEngine::new(triggers.clone(), config.seed)?.get_snapshot();

    // Create channels
    let (event_tx, event_rx) = mpsc::channel(100);
    let (action_tx, action_rx) = broadcast::channel(64);
    let (state_tx, state_rx) = watch::channel(initial_snapshot.clone());
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let (period_tx, period_rx) = watch::channel(period);

    // Spawn tasks
    let seed = config.seed;
    let engine_handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = run_engine_task(triggers, seed, event_rx, action_tx, state_tx, period_tx) {
            error!("Engine task failed: {}", e);
        }
    });
    tokio::spawn(start_tick_task(event_tx.clone(), period_rx));
    tokio::spawn(start_dispatch_task(action_rx));

    // Start API server
    let current_snapshot = Arc::new(RwLock::new(initial_snapshot));
    tokio::spawn(api::start_snapshot_task(
        state_rx,
        Arc::clone(&current_snapshot),
    ));

    let app = api::create_router(event_tx.clone(), current_snapshot, Arc::new(shutdown_tx));
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("API server listening on http://localhost:{}", config.port);
    tokio::spawn(async move {
        if let Err(e) = serve(listener, app).await {
            error!("API server stopped: {}", e);
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, sending panic");
            // Engine may already be gone; nothing to stop then
            let _ = event_tx.send(Event::Panic).await;
        }
        _ = shutdown_rx.wait_for(|stop| *stop) => {
            info!("Panic switch pressed");
        }
    }

    if tokio::time::timeout(Duration::from_secs(2), engine_handle)
        .await
        .is_err()
    {
        warn!("Engine task did not stop in time");
    }
    info!("Shutting down...");
    Ok(())
}
