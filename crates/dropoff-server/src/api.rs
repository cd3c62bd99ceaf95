//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `session` - Session snapshot and lifecycle intents
//! - `lockers` - Available lockers, open and reopen
//! - `notifications` - Recent failure notifications
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod lockers;
pub mod notifications;
pub mod openapi;
pub mod session;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                      - Health check
/// /api
/// ├── /session                 - Snapshot and lifecycle intents
/// ├── /lockers                 - List, refresh, open, reopen
/// ├── /notifications           - Recent failure notifications
/// └── /openapi.json            - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    // Initialize server start time for uptime tracking
    health::init_start_time();

    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec))
                // Session lifecycle
                .nest("/session", session::router())
                // Lockers and doors
                .nest("/lockers", lockers::router())
                // Notifications
                .nest("/notifications", notifications::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use dropoff_core::gateway::mock::ScriptedGateway;
    use dropoff_core::{
        AccessTokens, BackendError, BackendResult, Config, Credentials, DiscoveredTower,
        DropoffToken, Intent, Locker, LockerBackend, LockerId, SessionState,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const TOWER: &str = "00AA11BB22CC33DD";

    struct StubBackend {
        fail_auth: bool,
    }

    #[async_trait]
    impl LockerBackend for StubBackend {
        async fn authenticate(&self, _credentials: &Credentials) -> BackendResult<AccessTokens> {
            if self.fail_auth {
                return Err(BackendError::Status {
                    endpoint: "login/access-token".into(),
                    status: 401,
                    body: "bad credentials".into(),
                });
            }
            Ok(AccessTokens {
                bearer_token: "bearer".into(),
                token_type: "bearer".into(),
                sdk_token: "sdk".into(),
            })
        }

        async fn available_lockers(
            &self,
            _tower_id: &str,
            _bearer_token: &str,
        ) -> BackendResult<Vec<Locker>> {
            Ok(vec![
                Locker {
                    id: 1,
                    name: "A1".into(),
                },
                Locker {
                    id: 2,
                    name: "A2".into(),
                },
            ])
        }

        async fn create_dropoff_token(
            &self,
            tower_id: &str,
            locker_id: LockerId,
            _bearer_token: &str,
        ) -> BackendResult<DropoffToken> {
            Ok(DropoffToken {
                tower_id: tower_id.into(),
                locker_id,
                payload: "payload".into(),
                payload_auth: "auth".into(),
            })
        }
    }

    fn scripted_tower() -> ScriptedGateway {
        ScriptedGateway::new().announcing(vec![DiscoveredTower::with_id(TOWER)])
    }

    fn state_with(fail_auth: bool, gateway: ScriptedGateway) -> SharedState {
        let mut config = Config::default();
        config.tower.id = TOWER.into();
        config.session.poll_interval_ms = 5;
        AppState::new(
            config,
            Arc::new(StubBackend { fail_auth }),
            Arc::new(gateway),
        )
    }

    fn test_state(fail_auth: bool) -> SharedState {
        let gateway = scripted_tower()
            .with_sync_script([true, false])
            .with_door_script([false, true]);
        state_with(fail_auth, gateway)
    }

    async fn drive_to_in_range(app: &Router, state: &SharedState) {
        send(app, "POST", "/api/session/authenticate").await;
        send(app, "POST", "/api/session/initialize").await;
        send(app, "POST", "/api/session/discover").await;
        wait_for(state, |s| s.tower_in_range).await;
    }

    async fn send(app: &Router, method: &str, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_for(state: &SharedState, condition: impl Fn(&SessionState) -> bool) {
        let mut rx = state.coordinator.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| condition(s)))
            .await
            .expect("session did not reach the expected state")
            .unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state(false));

        let response = send(&app, "GET", "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tower_id"], TOWER);
        assert_eq!(body["phase"], "unauthenticated");
    }

    #[tokio::test]
    async fn test_initial_session_snapshot() {
        let app = create_router(test_state(false));

        let body = json_body(send(&app, "GET", "/api/session").await).await;

        assert_eq!(body["phase"], "unauthenticated");
        assert_eq!(
            body["enabled_intents"],
            serde_json::json!(["authenticate", "disconnect"])
        );
        assert!(body.get("bearer_token").is_none());
    }

    #[tokio::test]
    async fn test_authenticate_and_reauthenticate() {
        let app = create_router(test_state(false));

        let response = send(&app, "POST", "/api/session/authenticate").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["session"]["phase"], "authenticated");

        send(&app, "POST", "/api/session/initialize").await;
        let body = json_body(send(&app, "POST", "/api/session/authenticate").await).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["session"]["phase"], "sdk_ready");
    }

    #[tokio::test]
    async fn test_connect_while_connecting_is_skipped() {
        let state = state_with(false, scripted_tower().with_latency(Duration::from_secs(3600)));
        let app = create_router(state.clone());
        drive_to_in_range(&app, &state).await;

        let response = send(&app, "POST", "/api/session/connect").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        for _ in 0..100 {
            if state.coordinator.is_in_flight(Intent::Connect) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(state.coordinator.is_in_flight(Intent::Connect));

        let response = send(&app, "POST", "/api/session/connect").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "skipped");

        // A fresh session is not blocked by the abandoned attempt.
        send(&app, "POST", "/api/session/disconnect").await;
        assert!(!state.coordinator.is_in_flight(Intent::Connect));
    }

    #[tokio::test]
    async fn test_failed_authenticate_maps_to_401_and_notifies() {
        let state = test_state(true);
        let app = create_router(state.clone());

        let response = send(&app, "POST", "/api/session/authenticate").await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "AUTH_FAILED");
        assert_eq!(body["message"], "Failed to retrieve credentials");

        for _ in 0..100 {
            if !state.notifications().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let body = json_body(send(&app, "GET", "/api/notifications").await).await;
        assert_eq!(body["notifications"][0]["error_code"], "AUTH_FAILED");
        assert_eq!(body["notifications"][0]["title"], "Network error");
    }

    #[tokio::test]
    async fn test_gated_intents_are_skipped() {
        let app = create_router(test_state(false));

        for uri in [
            "/api/session/initialize",
            "/api/session/discover",
            "/api/session/connect",
            "/api/lockers/refresh",
            "/api/lockers/1/open",
            "/api/lockers/reopen",
        ] {
            let response = send(&app, "POST", uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(json_body(response).await["status"], "skipped", "{uri}");
        }
    }

    #[tokio::test]
    async fn test_full_dropoff_flow() {
        let state = test_state(false);
        let app = create_router(state.clone());

        assert_eq!(
            json_body(send(&app, "POST", "/api/session/authenticate").await).await["status"],
            "completed"
        );
        let body = json_body(send(&app, "POST", "/api/session/initialize").await).await;
        assert_eq!(body["status"], "completed");
        send(&app, "POST", "/api/session/discover").await;
        wait_for(&state, |s| s.tower_in_range).await;

        let response = send(&app, "POST", "/api/session/connect").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["status"], "accepted");
        wait_for(&state, |s| s.tower_synced).await;

        let response = send(&app, "POST", "/api/lockers/refresh").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(send(&app, "GET", "/api/lockers").await).await;
        assert_eq!(body["lockers"].as_array().unwrap().len(), 2);

        let response = send(&app, "POST", "/api/lockers/9/open").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "locker_not_available");

        let response = send(&app, "POST", "/api/lockers/1/open").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        wait_for(&state, |s| s.can_reopen_last_locker).await;

        let body = json_body(send(&app, "GET", "/api/lockers").await).await;
        assert_eq!(body["lockers"], serde_json::json!([{"id": 2, "name": "A2"}]));
        assert_eq!(body["can_reopen_last_locker"], true);

        let body = json_body(send(&app, "POST", "/api/lockers/reopen").await).await;
        assert_eq!(body["status"], "completed");

        let body = json_body(send(&app, "POST", "/api/session/disconnect").await).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["session"]["phase"], "unauthenticated");
        assert_eq!(body["session"]["available_lockers"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_openapi_endpoint() {
        let app = create_router(test_state(false));

        let response = send(&app, "GET", "/api/openapi.json").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["info"]["title"], "dropoff API");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_router(test_state(false));
        let response = send(&app, "GET", "/api/passes").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
