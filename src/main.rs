//! Wing racer headless runner
//!
//! Loads an optional arena, spawns seeded bot racers and steps the
//! simulation on a fixed tick until shutdown, logging lifecycle events and
//! periodic snapshots.

use anyhow::Context;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wing_racer_engine::app::AppState;
use wing_racer_engine::config::Config;
use wing_racer_engine::game::{SnapshotBuilder, WorldEvent};
use wing_racer_engine::util::time::{
    init_server_time, tick_duration, uptime_secs, Timer, SNAPSHOT_TPS,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting wing racer simulation");
    info!(
        tick_rate = config.tick_rate,
        time_scale = config.time_scale,
        bots = config.bot_count,
        seed = config.sim_seed,
        "Simulation settings"
    );

    let state = AppState::new(config.clone());

    if let Some(path) = &config.map_path {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading map {}", path.display()))?;
        state.game.lock().load_map(&raw)?;
        info!(path = %path.display(), "Arena loaded");
    } else {
        warn!("MAP_PATH not set, racing in an open arena");
    }

    // Subscribe before spawning so the first spawns are logged too
    let events = state.game.lock().world().subscribe();
    tokio::spawn(log_world_events(events));

    spawn_bots(&state)?;

    tokio::select! {
        _ = run_tick_loop(state.clone()) => {}
        _ = shutdown_signal() => {}
    }

    let game = state.game.lock();
    info!(
        players = game.world().player_count(),
        simulated_ms = game.world().physics().elapsed().as_millis() as u64,
        uptime_secs = uptime_secs(),
        "Simulation shutdown complete"
    );
    Ok(())
}

/// Spawn the configured bots; the first one becomes the self player
fn spawn_bots(state: &AppState) -> anyhow::Result<()> {
    let mut game = state.game.lock();
    let mut bots = state.bots.lock();

    let mut first = None;
    for _ in 0..state.config.bot_count {
        let id = bots.spawn(game.world_mut());
        first.get_or_insert(id);
    }

    if let Some(id) = first {
        game.set_me(&id)?;
    }
    Ok(())
}

/// Run the fixed-rate simulation loop
async fn run_tick_loop(state: AppState) {
    let tick_rate = state.config.tick_rate;
    let budget_micros = tick_duration(tick_rate).as_micros() as u64;

    let mut tick_interval = interval(tick_duration(tick_rate));
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut snapshot_builder = SnapshotBuilder::new(tick_rate / SNAPSHOT_TPS);
    snapshot_builder.force_next();
    let mut tick: u64 = 0;

    loop {
        tick_interval.tick().await;
        tick += 1;

        let timer = Timer::new();
        let mut game = state.game.lock();
        state.bots.lock().drive(game.world_mut());
        game.tick();

        if snapshot_builder.should_send() {
            let snapshot = snapshot_builder.build(tick, game.world());
            match serde_json::to_string(&snapshot) {
                Ok(json) => debug!(tick, snapshot = %json, "World snapshot"),
                Err(err) => error!(tick, error = %err, "Failed to serialize snapshot"),
            }
        }
        drop(game);

        let spent = timer.elapsed_micros();
        if spent > budget_micros {
            warn!(tick, spent_us = spent, budget_us = budget_micros, "Tick over budget");
        }
    }
}

/// Log spawn and despawn notifications until the world goes away
async fn log_world_events(mut events: broadcast::Receiver<WorldEvent>) {
    loop {
        match events.recv().await {
            Ok(WorldEvent::PlayerSpawn(id)) => info!(player_id = %id, "Racer joined"),
            Ok(WorldEvent::PlayerDespawn(id)) => info!(player_id = %id, "Racer left"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "World event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
