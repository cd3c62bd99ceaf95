//! # dropoff-server
//!
//! HTTP server for the dropoff locker tower client.
//!
//! This binary provides:
//! - REST API for the tower session lifecycle and locker operations
//! - OpenAPI specification at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! DROPOFF_CONFIG=./config.toml cargo run --package dropoff-server
//!
//! # Production
//! DROPOFF__SERVER__PRODUCTION=true ./dropoff-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use anyhow::Context;
use dropoff_core::Config;
use dropoff_server::api::create_router;
use dropoff_server::logging;
use dropoff_server::state::AppState;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration decides the logging mode, so it loads first
    let config = Config::load_from_env().context("Failed to load configuration")?;

    logging::init(&config.server)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        tower_id = %config.tower.id,
        environment = %config.tower.sdk_environment,
        "Starting dropoff-server"
    );

    let addr = config.server.listen_addr;
    let state = AppState::from_config(config)?;
    let app = create_router(state.clone());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Leave the tower in a clean state
    state.coordinator.terminate();
    info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
