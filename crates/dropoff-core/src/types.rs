//! Shared types and OpenAPI schemas.
//!
//! Session-specific types live in [`crate::session`]; this module holds the
//! records exchanged between the backend, the gateway and the shell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::DropoffError;

/// Identifier of a single locker inside a tower.
pub type LockerId = u64;

/// A locker that is currently safe to use as a drop-off target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Locker {
    /// Backend locker id.
    #[schema(example = 1)]
    pub id: LockerId,

    /// Human-readable locker label.
    #[schema(example = "A1")]
    pub name: String,
}

/// Tokens obtained from the backend for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTokens {
    /// Bearer token for REST calls.
    pub bearer_token: String,
    /// Token type reported alongside the bearer token (usually `bearer`).
    pub token_type: String,
    /// Access token handed to the tower SDK.
    pub sdk_token: String,
}

/// One-time encrypted open command for a specific locker.
///
/// Only `payload` and `payload_auth` come from the backend. The tower and
/// locker ids record what the token was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropoffToken {
    /// Tower the token was issued for.
    pub tower_id: String,
    /// Locker the token was issued for.
    pub locker_id: LockerId,
    /// Encrypted command payload.
    pub payload: String,
    /// Authentication tag for the payload.
    pub payload_auth: String,
}

/// A user-visible failure notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "01926f1e-8b7a-7c3e-9a61-2f1d3c4b5a69",
    "title": "Door error",
    "message": "Could not verify door state",
    "error_code": "DOOR_VERIFY_TIMEOUT",
    "raised_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct Notification {
    /// Time-ordered notification id.
    pub id: Uuid,

    /// Short title.
    #[schema(example = "Door error")]
    pub title: String,

    /// Message body.
    #[schema(example = "Could not verify door state")]
    pub message: String,

    /// Machine-readable code of the underlying error.
    #[schema(example = "DOOR_VERIFY_TIMEOUT")]
    pub error_code: String,

    /// When the notification was raised.
    pub raised_at_utc: DateTime<Utc>,
}

impl Notification {
    /// Build the notification that surfaces `err` to the user.
    #[must_use]
    pub fn from_error(err: &DropoffError) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: err.title(),
            message: err.user_message(),
            error_code: err.error_code().to_string(),
            raised_at_utc: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_from_error() {
        let err = DropoffError::Network("connection reset".into());
        let notification = Notification::from_error(&err);
        assert_eq!(notification.title, "Network error");
        assert_eq!(notification.message, "Failed to retrieve lockers");
        assert_eq!(notification.error_code, "DIRECTORY_FETCH_FAILED");
    }

    #[test]
    fn test_notification_ids_are_ordered() {
        let err = DropoffError::DoorCommand("rejected".into());
        let first = Notification::from_error(&err);
        let second = Notification::from_error(&err);
        assert!(first.id < second.id);
    }
}
