//! Arena Match Server - coordinator-driven match lifecycle for an arena brawler
//!
//! This is the main entry point. It:
//! - hosts simulated bot matches over the in-process room transport
//! - serves a read-only HTTP status surface for rooms and matches

mod app;
mod config;
mod game;
mod http;
mod net;
mod sim;
mod util;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::{Config, LogFormat};
use crate::http::build_router;
use crate::sim::{prune_rooms, SimHost};
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Arena Match Server");
    info!("Server address: {}", config.server_addr);
    info!(
        max_rounds = config.rules.max_rounds,
        round_secs = config.rules.durations.standard.as_secs(),
        final_round_secs = config.rules.durations.final_round.as_secs(),
        spawn_points = config.spawn_points.len(),
        "Match rules loaded"
    );
    if config.spawn_points.is_empty() {
        warn!("No spawn points configured, avatars will use the fallback position");
    }

    // Create application state
    let state = AppState::new(config.clone());

    // Spawn the simulated matches
    if config.sim.matches > 0 {
        let host = SimHost::new(
            state.rooms.clone(),
            config.rules.clone(),
            config.spawn_points.clone(),
            config.sim.clone(),
        );
        tokio::spawn(async move {
            host.run().await;
        });
    }

    // Spawn the room janitor
    tokio::spawn(prune_rooms(state.rooms.clone(), config.sim.room_linger));

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Room status: http://{}/rooms", addr);
    info!("Match rules: http://{}/rules", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
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
