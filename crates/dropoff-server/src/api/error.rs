//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dropoff_core::DropoffError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 401 Unauthorized - The backend refused the configured credentials.
    Unauthorized {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - The tower refused in its current state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Notification title shown to the user.
        title: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },

    /// 502 Bad Gateway - The REST backend failed.
    BadGateway {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Underlying failure.
        details: Option<String>,
    },

    /// 503 Service Unavailable - The radio link to the tower failed.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 504 Gateway Timeout - A poll budget ran out.
    GatewayTimeout {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "DIRECTORY_FETCH_FAILED",
    "message": "Failed to retrieve lockers",
    "details": "towers/00aa11bb22cc33dd/lockers returned HTTP 503: maintenance"
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "SYNC_TIMEOUT").
    #[schema(example = "DIRECTORY_FETCH_FAILED")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Failed to retrieve lockers")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::Unauthorized { error_code, message } => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::NotFound { error_code, message } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::Conflict {
                error_code,
                message,
                title,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: Some(serde_json::json!({ "title": title })),
                },
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                // Log internal errors
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::BadGateway {
                error_code,
                message,
                details,
            } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(|d| serde_json::json!(d)),
                },
            ),

            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(|d| serde_json::json!(d)),
                },
            ),

            Self::GatewayTimeout { error_code, message } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized { message, .. } => write!(f, "Unauthorized: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::InternalError { message, .. } => {
                write!(f, "Internal Error: {message}")
            }
            Self::BadGateway { message, .. } => write!(f, "Bad Gateway: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
            Self::GatewayTimeout { message, .. } => write!(f, "Gateway Timeout: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from dropoff_core errors.
impl From<DropoffError> for ApiError {
    fn from(err: DropoffError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.user_message();

        match err.http_status_code() {
            401 => Self::Unauthorized {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
                title: err.title(),
            },
            502 => Self::BadGateway {
                error_code,
                message,
                details: Some(err.to_string()),
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details: Some(err.to_string()),
            },
            504 => Self::GatewayTimeout {
                error_code,
                message,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: Some(err.to_string()),
            },
        }
    }
}

impl From<dropoff_core::ConfigError> for ApiError {
    fn from(err: dropoff_core::ConfigError) -> Self {
        Self::from(DropoffError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ApiError::NotFound {
            error_code: "locker_not_available".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_dropoff_errors_map_to_status() {
        let cases = [
            (DropoffError::Auth("refused".into()), StatusCode::UNAUTHORIZED),
            (
                DropoffError::Session {
                    code: 3,
                    message: "busy".into(),
                },
                StatusCode::CONFLICT,
            ),
            (DropoffError::Network("reset".into()), StatusCode::BAD_GATEWAY),
            (
                DropoffError::ConnectionFailed("out of range".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DropoffError::SyncTimeout { ticks: 30 },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                DropoffError::ConfigValidationError("tower.id".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_conflict_carries_title() {
        let err = ApiError::from(DropoffError::Session {
            code: 3,
            message: "busy".into(),
        });
        match err {
            ApiError::Conflict { title, message, .. } => {
                assert_eq!(title, "Error establishing session - 3");
                assert_eq!(message, "busy");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
