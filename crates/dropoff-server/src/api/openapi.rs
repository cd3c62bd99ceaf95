//! OpenAPI specification generation for the dropoff API.
//!
//! The generated document is served at `/api/openapi.json` and written to
//! the workspace root by the `gen-openapi` binary for client generation.

use axum::Json;
use dropoff_core::{Intent, Locker, Notification, SessionPhase};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::lockers::LockersResponse;
use super::notifications::NotificationsResponse;
use super::session::{IntentResponse, IntentStatus, SessionResponse};

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json` and returns the complete
/// OpenAPI 3.0 specification for the dropoff API.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for dropoff.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "dropoff API",
        version = "0.1.0",
        description = r#"
# dropoff API

dropoff drives a smart locker tower from a phone or kiosk: it authenticates
against the locker backend, finds the tower over short-range radio, opens a
session and opens individual lockers for drop-off.

## Flow

1. **authenticate**: exchange the configured credentials for tokens
2. **initialize**: hand the SDK token to the tower SDK
3. **discover**: scan until the configured tower is in range
4. **connect**: open a session and wait for the tower to sync (background)
5. **lockers/refresh**: list the available lockers
6. **lockers/{id}/open**: open a locker and confirm its door (background)
7. **lockers/reopen**: reopen the last confirmed locker
8. **disconnect**: terminate and reset at any time

Every intent is gated by the session; `enabled_intents` in the session
snapshot lists the ones that would run. A gated-off intent answers `skipped`.
Background intents report failures on `/api/notifications`.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local dropoff server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks"
        ),
        (
            name = "session",
            description = "Tower session lifecycle: authenticate, initialize, discover, connect, disconnect"
        ),
        (
            name = "lockers",
            description = "Available lockers and door operations"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Session endpoints
        super::session::get_session,
        super::session::authenticate,
        super::session::initialize,
        super::session::discover,
        super::session::connect,
        super::session::disconnect,
        // Locker endpoints
        super::lockers::list_lockers,
        super::lockers::refresh_lockers,
        super::lockers::open_locker,
        super::lockers::reopen_locker,
        // Notification endpoints
        super::notifications::list_notifications,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Session types
            SessionPhase,
            Intent,
            IntentStatus,
            SessionResponse,
            IntentResponse,
            // Locker types
            Locker,
            LockersResponse,
            // Notification types
            Notification,
            NotificationsResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "dropoff API");
        assert!(spec.paths.paths.contains_key("/api/lockers/{locker_id}/open"));
        assert!(spec.paths.paths.contains_key("/api/session/connect"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"dropoff API\""));
    }
}
