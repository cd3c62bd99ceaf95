//! Locker API endpoints.
//!
//! Opening a locker fetches a drop-off token, sends the open command and then
//! waits for the door sensor, so it runs in the background and answers `202`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use dropoff_core::{Intent, Locker, LockerId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::api::session::{
    can_start, reply, spawn_intent, IntentReply, IntentResponse, IntentStatus,
};
use crate::state::SharedState;

/// Creates the lockers router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_lockers))
        .route("/refresh", post(refresh_lockers))
        .route("/reopen", post(reopen_locker))
        .route("/{locker_id}/open", post(open_locker))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Lockers available for drop-off.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "lockers": [{"id": 1, "name": "A1"}, {"id": 3, "name": "A3"}],
    "can_reopen_last_locker": false
}))]
pub struct LockersResponse {
    /// Available lockers, in directory order.
    pub lockers: Vec<Locker>,

    /// Whether the last opened locker may be reopened.
    pub can_reopen_last_locker: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// List available lockers.
#[utoipa::path(
    get,
    path = "/api/lockers",
    tag = "lockers",
    operation_id = "listLockers",
    summary = "List available lockers",
    description = "Returns the lockers from the last refresh, minus any locker \
        whose door has since been confirmed open.",
    responses(
        (status = 200, description = "Available lockers", body = LockersResponse)
    )
)]
pub async fn list_lockers(State(state): State<SharedState>) -> Json<LockersResponse> {
    let session = state.coordinator.snapshot();
    Json(LockersResponse {
        lockers: session.available_lockers,
        can_reopen_last_locker: session.can_reopen_last_locker,
    })
}

/// Refresh the available locker list.
#[utoipa::path(
    post,
    path = "/api/lockers/refresh",
    tag = "lockers",
    operation_id = "refreshLockers",
    summary = "Refresh available lockers",
    description = "Fetches the tower's lockers from the backend and keeps the \
        available ones. Requires a synced session. On failure the previous \
        list is kept.",
    responses(
        (status = 200, description = "Refreshed or skipped", body = IntentResponse),
        (status = 502, description = "Directory fetch failed", body = ErrorResponse)
    )
)]
pub async fn refresh_lockers(State(state): State<SharedState>) -> ApiResult<IntentReply> {
    let outcome = state.coordinator.refresh_lockers().await?;
    Ok(reply(&state, Intent::RefreshLockers, outcome.into()))
}

/// Open a locker.
#[utoipa::path(
    post,
    path = "/api/lockers/{locker_id}/open",
    tag = "lockers",
    operation_id = "openLocker",
    summary = "Open a locker for drop-off",
    description = "Requests a drop-off token, sends the open command and waits \
        for the door to report open. Runs in the background; the locker \
        disappears from the list once its door is confirmed.",
    params(
        ("locker_id" = u64, Path, description = "Locker to open")
    ),
    responses(
        (status = 202, description = "Open started", body = IntentResponse),
        (status = 200, description = "Session not synced or an open is running; skipped", body = IntentResponse),
        (status = 404, description = "Locker is not available", body = ErrorResponse)
    )
)]
pub async fn open_locker(
    State(state): State<SharedState>,
    Path(locker_id): Path<LockerId>,
) -> ApiResult<IntentReply> {
    if !can_start(&state, Intent::OpenLocker) {
        return Ok(reply(&state, Intent::OpenLocker, IntentStatus::Skipped));
    }
    let session = state.coordinator.snapshot();
    if !session.available_lockers.iter().any(|l| l.id == locker_id) {
        return Err(ApiError::NotFound {
            error_code: "locker_not_available".to_string(),
            message: format!("Locker {locker_id} is not available for drop-off"),
        });
    }

    let coordinator = Arc::clone(&state.coordinator);
    spawn_intent(Intent::OpenLocker, async move {
        coordinator.open_locker(locker_id).await
    });
    Ok(reply(&state, Intent::OpenLocker, IntentStatus::Accepted))
}

/// Reopen the last opened locker.
#[utoipa::path(
    post,
    path = "/api/lockers/reopen",
    tag = "lockers",
    operation_id = "reopenLocker",
    summary = "Reopen the last locker",
    description = "Reopens the last locker whose door was confirmed open. \
        Skipped if no locker qualifies, including after a newer open attempt.",
    responses(
        (status = 200, description = "Reopened or skipped", body = IntentResponse)
    )
)]
pub async fn reopen_locker(State(state): State<SharedState>) -> IntentReply {
    let outcome = state.coordinator.reopen();
    reply(&state, Intent::Reopen, outcome.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockers_response_serialization() {
        let response = LockersResponse {
            lockers: vec![Locker {
                id: 3,
                name: "A3".into(),
            }],
            can_reopen_last_locker: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"id\":3"));
        assert!(json.contains("\"can_reopen_last_locker\":true"));
    }
}
