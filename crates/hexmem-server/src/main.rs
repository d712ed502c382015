//! HexMem Server - multi-tenant structured semantic memory for agents.
//!
//! Serves the `/api/v1` surface, runs the hourly decay sweep and the
//! six-hourly query-log prune, and shuts both down with the listener on
//! SIGINT/SIGTERM.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use hexmem_core::{analytics, decay, Storage};
use hexmem_server::config::Config;
use hexmem_server::routes;

/// Decay sweep cadence.
const DECAY_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Query-log prune cadence.
const LOG_PRUNE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
/// How long shutdown waits for background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let config = Config::from_env();
    info!("HexMem server v{} starting...", env!("CARGO_PKG_VERSION"));

    let state = match hexmem_server::compose(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    if config.dev_key.is_none() {
        match state.storage.list_api_keys() {
            Ok(keys) if keys.is_empty() => warn!(
                "no HEXMEM_DEV_KEY and no persisted API keys; every /api/v1 request will be 401"
            ),
            Err(e) => warn!("could not inspect api_keys at boot: {}", e),
            _ => {}
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let decay_task = tokio::spawn(decay_ticker(state.storage.clone(), shutdown_rx.clone()));
    let prune_task = tokio::spawn(prune_ticker(state.storage.clone(), shutdown_rx));

    let app = routes::build_router(state);
    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Could not bind {}: {}", config.addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on http://{}", config.addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    // Stop the tickers, but never hang shutdown on them
    let _ = shutdown_tx.send(true);
    let drain = async {
        let _ = decay_task.await;
        let _ = prune_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("background tasks did not stop within the grace period");
    }

    info!("HexMem server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("could not install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}

/// Hourly full-fleet decay sweep.
async fn decay_ticker(storage: Arc<Storage>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(DECAY_SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // immediate first tick is not a sweep

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match decay::sweep(&storage, None) {
                    Ok(stats) => info!(
                        cooled = stats.transitioned_to_cooling,
                        archived = stats.transitioned_to_archived,
                        immune = stats.immune_items,
                        "scheduled decay sweep complete"
                    ),
                    Err(e) => warn!("scheduled decay sweep failed: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Six-hourly query-log prune.
async fn prune_ticker(storage: Arc<Storage>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(LOG_PRUNE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match storage.prune_query_log(analytics::RETENTION_DAYS) {
                    Ok(pruned) if pruned > 0 => info!(pruned, "query log pruned"),
                    Ok(_) => {}
                    Err(e) => warn!("query log prune failed: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
