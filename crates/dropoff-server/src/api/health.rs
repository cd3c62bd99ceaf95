//! Health check API endpoint.
//!
//! Provides a simple health check endpoint for monitoring and load balancers.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use dropoff_core::SessionPhase;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

static SERVER_START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the server start time. Call this once at startup.
pub fn init_start_time() {
    SERVER_START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    SERVER_START_TIME
        .get()
        .map_or(0, |start| start.elapsed().as_secs())
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "uptime_secs": 3600,
    "tower_id": "00AA11BB22CC33DD",
    "phase": "synced"
}))]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version from Cargo.toml.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Server uptime in seconds.
    #[schema(example = 3600)]
    pub uptime_secs: u64,

    /// Tower this server coordinates.
    #[schema(example = "00AA11BB22CC33DD")]
    pub tower_id: String,

    /// Current session phase.
    pub phase: SessionPhase,
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint.
///
/// Returns basic service status information including version and the
/// current session phase.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    description = "Returns basic service status information. Use this endpoint \
        for load balancer health checks and monitoring.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime_secs(),
        tower_id: state.config.tower.id.clone(),
        phase: state.coordinator.snapshot().phase(),
    })
}
