//! Notification API endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use dropoff_core::Notification;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the notifications router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(list_notifications))
}

/// Recent failure notifications.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationsResponse {
    /// Notifications, oldest first.
    pub notifications: Vec<Notification>,
}

/// List recent notifications.
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "session",
    operation_id = "listNotifications",
    summary = "List recent notifications",
    description = "Returns the most recent failure notifications, oldest first. \
        Background intents (connect, open) report their failures here.",
    responses(
        (status = 200, description = "Recent notifications", body = NotificationsResponse)
    )
)]
pub async fn list_notifications(State(state): State<SharedState>) -> Json<NotificationsResponse> {
    Json(NotificationsResponse {
        notifications: state.notifications().await,
    })
}
