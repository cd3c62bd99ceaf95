//! Session API endpoints.
//!
//! Every intent is gated by the session state. An intent whose precondition
//! does not hold is a safe no-op and answers `200` with status `skipped`.
//! Connecting can take up to the whole sync budget, so it runs in the
//! background and answers `202`; its failure arrives as a notification.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dropoff_core::{Intent, Locker, Outcome, SessionPhase, SessionState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::{AppState, SharedState};

/// Creates the session router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_session))
        .route("/authenticate", post(authenticate))
        .route("/initialize", post(initialize))
        .route("/discover", post(discover))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Snapshot of the tower session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "tower_id": "00AA11BB22CC33DD",
    "phase": "synced",
    "authenticated": true,
    "sdk_initialized": true,
    "tower_in_range": true,
    "tower_synced": true,
    "can_reopen_last_locker": false,
    "available_lockers": [{"id": 1, "name": "A1"}],
    "enabled_intents": ["authenticate", "disconnect", "refresh_lockers", "open_locker"]
}))]
pub struct SessionResponse {
    /// Tower this session targets.
    #[schema(example = "00AA11BB22CC33DD")]
    pub tower_id: String,

    /// Coarse lifecycle phase.
    pub phase: SessionPhase,

    /// Whether backend tokens are held.
    pub authenticated: bool,

    /// Whether the tower SDK is initialized.
    pub sdk_initialized: bool,

    /// Whether discovery reported the tower.
    pub tower_in_range: bool,

    /// Whether the tower finished syncing.
    pub tower_synced: bool,

    /// Whether the last opened locker may be reopened.
    pub can_reopen_last_locker: bool,

    /// Lockers available for drop-off.
    pub available_lockers: Vec<Locker>,

    /// Intents whose preconditions currently hold.
    pub enabled_intents: Vec<Intent>,
}

impl SessionResponse {
    /// Build the response for `session`.
    pub fn new(tower_id: &str, session: &SessionState) -> Self {
        Self {
            tower_id: tower_id.to_string(),
            phase: session.phase(),
            authenticated: session.is_authenticated(),
            sdk_initialized: session.sdk_initialized,
            tower_in_range: session.tower_in_range,
            tower_synced: session.tower_synced,
            can_reopen_last_locker: session.can_reopen_last_locker,
            available_lockers: session.available_lockers.clone(),
            enabled_intents: session.enabled_intents(),
        }
    }
}

/// What happened to an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// The intent ran to completion.
    Completed,
    /// The intent's precondition did not hold; nothing was done.
    Skipped,
    /// The session was terminated while the intent ran.
    Abandoned,
    /// The intent was started in the background.
    Accepted,
}

impl From<Outcome> for IntentStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => Self::Completed,
            Outcome::Skipped(_) => Self::Skipped,
            Outcome::Abandoned => Self::Abandoned,
        }
    }
}

/// Result of an intent, with the session as it is afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "intent": "connect",
    "status": "accepted",
    "session": {
        "tower_id": "00AA11BB22CC33DD",
        "phase": "tower_in_range",
        "authenticated": true,
        "sdk_initialized": true,
        "tower_in_range": true,
        "tower_synced": false,
        "can_reopen_last_locker": false,
        "available_lockers": [],
        "enabled_intents": ["authenticate", "connect", "disconnect"]
    }
}))]
pub struct IntentResponse {
    /// The intent that was requested.
    pub intent: Intent,

    /// What happened to it.
    pub status: IntentStatus,

    /// Session snapshot after the intent.
    pub session: SessionResponse,
}

/// Status code plus body returned by intent handlers.
pub type IntentReply = (StatusCode, Json<IntentResponse>);

/// Answer `intent` with `status` and the current session.
pub(crate) fn reply(state: &AppState, intent: Intent, status: IntentStatus) -> IntentReply {
    let code = if status == IntentStatus::Accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    let session = SessionResponse::new(&state.config.tower.id, &state.coordinator.snapshot());
    (
        code,
        Json(IntentResponse {
            intent,
            status,
            session,
        }),
    )
}

/// Whether a background intent would do anything if started now: its
/// precondition holds and no attempt of it is running.
pub(crate) fn can_start(state: &SharedState, intent: Intent) -> bool {
    intent.is_enabled(&state.coordinator.snapshot()) && !state.coordinator.is_in_flight(intent)
}

/// Run a long intent in the background. Failures are already published as
/// notifications by the coordinator.
pub(crate) fn spawn_intent<F>(intent: Intent, task: F)
where
    F: Future<Output = dropoff_core::Result<Outcome>> + Send + 'static,
{
    info!(%intent, "Starting background intent");
    tokio::spawn(async move {
        match task.await {
            Ok(Outcome::Skipped(_)) => info!(%intent, "Background intent skipped"),
            Ok(outcome) => debug!(%intent, ?outcome, "Background intent finished"),
            Err(err) => debug!(%intent, error = %err, "Background intent failed"),
        }
    });
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the current session.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "session",
    operation_id = "getSession",
    summary = "Get the session snapshot",
    description = "Returns the session phase, all flags, the available lockers \
        and the intents whose preconditions currently hold.",
    responses(
        (status = 200, description = "Session snapshot", body = SessionResponse)
    )
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionResponse> {
    Json(SessionResponse::new(
        &state.config.tower.id,
        &state.coordinator.snapshot(),
    ))
}

/// Authenticate against the backend.
#[utoipa::path(
    post,
    path = "/api/session/authenticate",
    tag = "session",
    operation_id = "authenticate",
    summary = "Exchange credentials for tokens",
    description = "Exchanges the configured credentials for a bearer token and \
        an SDK token. Allowed at any time: a later call replaces the tokens \
        and leaves the rest of the session alone.",
    responses(
        (status = 200, description = "Authenticated, or skipped while another attempt runs", body = IntentResponse),
        (status = 401, description = "Credentials refused", body = ErrorResponse)
    )
)]
pub async fn authenticate(State(state): State<SharedState>) -> ApiResult<IntentReply> {
    let outcome = state.coordinator.authenticate().await?;
    Ok(reply(&state, Intent::Authenticate, outcome.into()))
}

/// Initialize the tower SDK.
#[utoipa::path(
    post,
    path = "/api/session/initialize",
    tag = "session",
    operation_id = "initializeSdk",
    summary = "Initialize the tower SDK",
    description = "Hands the SDK token to the tower SDK and initializes it. \
        Runs at most once per session.",
    responses(
        (status = 200, description = "Initialized or skipped", body = IntentResponse)
    )
)]
pub async fn initialize(State(state): State<SharedState>) -> IntentReply {
    let outcome = state.coordinator.initialize_sdk();
    reply(&state, Intent::InitializeSdk, outcome.into())
}

/// Start tower discovery.
#[utoipa::path(
    post,
    path = "/api/session/discover",
    tag = "session",
    operation_id = "discover",
    summary = "Start tower discovery",
    description = "Starts radio discovery. The session reports `tower_in_range` \
        once the configured tower is seen.",
    responses(
        (status = 200, description = "Discovery started or skipped", body = IntentResponse)
    )
)]
pub async fn discover(State(state): State<SharedState>) -> IntentReply {
    let outcome = state.coordinator.discover();
    reply(&state, Intent::Discover, outcome.into())
}

/// Connect to the tower.
#[utoipa::path(
    post,
    path = "/api/session/connect",
    tag = "session",
    operation_id = "connect",
    summary = "Connect and sync with the tower",
    description = "Connects to the tower, opens a session and waits for the \
        tower to sync. Runs in the background; watch the session for \
        `tower_synced` and the notifications for failures.",
    responses(
        (status = 202, description = "Connect started", body = IntentResponse),
        (status = 200, description = "Tower not in range or already connecting; skipped", body = IntentResponse)
    )
)]
pub async fn connect(State(state): State<SharedState>) -> IntentReply {
    if !can_start(&state, Intent::Connect) {
        return reply(&state, Intent::Connect, IntentStatus::Skipped);
    }

    let coordinator = Arc::clone(&state.coordinator);
    spawn_intent(Intent::Connect, async move { coordinator.connect().await });
    reply(&state, Intent::Connect, IntentStatus::Accepted)
}

/// Terminate the session.
#[utoipa::path(
    post,
    path = "/api/session/disconnect",
    tag = "session",
    operation_id = "disconnect",
    summary = "Terminate the session",
    description = "Terminates the tower session and resets all session state. \
        Allowed at any time; background intents are abandoned.",
    responses(
        (status = 200, description = "Session reset", body = IntentResponse)
    )
)]
pub async fn disconnect(State(state): State<SharedState>) -> IntentReply {
    let outcome = state.coordinator.terminate();
    reply(&state, Intent::Disconnect, outcome.into())
}
