//! Unified error types for the dropoff core library.
//!
//! [`DropoffError`] covers every failure an intent can end in. Modules keep
//! their own specific error types ([`ConfigError`](crate::config::ConfigError),
//! [`BackendError`](crate::backend::BackendError),
//! [`GatewayError`](crate::gateway::GatewayError)) and the coordinator maps
//! them into this taxonomy at the point where the meaning is known.
//!
//! # Design Principles
//!
//! - **One variant per failure mode**: an auth failure and a directory failure
//!   are both network problems underneath but are surfaced differently
//! - **Terminal**: none of these errors is retried automatically
//! - **Presentable**: every variant has a notification title, a machine code
//!   and an HTTP status
//!
//! # Example
//!
//! ```rust
//! use dropoff_core::error::{DropoffError, Result};
//!
//! fn require_token(token: &str) -> Result<()> {
//!     if token.is_empty() {
//!         return Err(DropoffError::Auth("no bearer token".into()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::LockerId;

/// The unified error type for all dropoff operations.
#[derive(Debug, Error)]
pub enum DropoffError {
    // =========================================================================
    // BACKEND ERRORS
    // =========================================================================
    /// Exchanging application credentials for tokens failed.
    #[error("Failed to retrieve credentials: {0}")]
    Auth(String),

    /// Fetching the locker directory failed.
    #[error("Failed to retrieve lockers: {0}")]
    Network(String),

    /// Requesting a drop-off token for a locker failed.
    #[error("Failed to create drop-off token for locker {locker_id}: {message}")]
    Token {
        /// Locker the token was requested for.
        locker_id: LockerId,
        /// Underlying failure.
        message: String,
    },

    // =========================================================================
    // TOWER SESSION ERRORS
    // =========================================================================
    /// The radio-level connection to the tower could not be established.
    #[error("Could not connect to tower: {0}")]
    ConnectionFailed(String),

    /// The tower rejected the session request.
    #[error("Tower rejected session (code {code}): {message}")]
    Session {
        /// Error code reported by the tower SDK.
        code: i32,
        /// Message reported by the tower SDK.
        message: String,
    },

    /// The tower kept syncing for the whole sync budget.
    #[error("Tower could not sync within {ticks} polls")]
    SyncTimeout {
        /// Number of polls the budget allowed.
        ticks: u32,
    },

    // =========================================================================
    // DOOR ERRORS
    // =========================================================================
    /// The tower rejected the open command.
    #[error("Could not open target door: {0}")]
    DoorCommand(String),

    /// The door sensor never reported open within the door budget.
    #[error("Could not verify door state of locker {locker_id} within {ticks} polls")]
    DoorVerifyTimeout {
        /// Locker whose door was being checked.
        locker_id: LockerId,
        /// Number of polls the budget allowed.
        ticks: u32,
    },

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration sources could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for dropoff operations.
pub type Result<T> = std::result::Result<T, DropoffError>;

impl DropoffError {
    /// Returns `true` if this error came from one of the REST clients.
    #[inline]
    #[must_use]
    pub const fn is_backend_error(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Network(_) | Self::Token { .. })
    }

    /// Returns `true` if this error came from establishing a tower session.
    #[inline]
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Session { .. } | Self::SyncTimeout { .. }
        )
    }

    /// Returns `true` if this error came from an open attempt at the tower.
    #[inline]
    #[must_use]
    pub const fn is_door_error(&self) -> bool {
        matches!(self, Self::DoorCommand(_) | Self::DoorVerifyTimeout { .. })
    }

    /// Returns `true` if a poll budget ran out.
    #[inline]
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::SyncTimeout { .. } | Self::DoorVerifyTimeout { .. })
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Title of the user-visible notification for this error.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::Auth(_) | Self::Network(_) | Self::Token { .. } => "Network error".to_string(),
            Self::ConnectionFailed(_) => "Error establishing session".to_string(),
            Self::Session { code, .. } => format!("Error establishing session - {code}"),
            Self::SyncTimeout { .. } => "Timeout exceeded".to_string(),
            Self::DoorCommand(_) | Self::DoorVerifyTimeout { .. } => "Door error".to_string(),
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_) => {
                "Configuration error".to_string()
            }
            Self::IoError(_) => "I/O error".to_string(),
        }
    }

    /// Body of the user-visible notification for this error.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(_) => "Failed to retrieve credentials".to_string(),
            Self::Network(_) => "Failed to retrieve lockers".to_string(),
            Self::Token { .. } => "Failed to create drop-off token".to_string(),
            Self::Session { message, .. } => message.clone(),
            Self::SyncTimeout { .. } => "Tower could not sync".to_string(),
            Self::DoorCommand(_) => "Could not open target door".to_string(),
            Self::DoorVerifyTimeout { .. } => "Could not verify door state".to_string(),
            Self::ConnectionFailed(_)
            | Self::ConfigNotFound(_)
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_)
            | Self::IoError(_) => self.to_string(),
        }
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 401 Unauthorized - credentials were refused or unreachable
            Self::Auth(_) => 401,

            // 409 Conflict - the tower refused in its current state
            Self::Session { .. } | Self::DoorCommand(_) => 409,

            // 500 Internal Server Error
            Self::ConfigNotFound(_)
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_)
            | Self::IoError(_) => 500,

            // 502 Bad Gateway - upstream REST backend failed
            Self::Network(_) | Self::Token { .. } => 502,

            // 503 Service Unavailable - radio link failed
            Self::ConnectionFailed(_) => 503,

            // 504 Gateway Timeout - poll budget exhausted
            Self::SyncTimeout { .. } | Self::DoorVerifyTimeout { .. } => 504,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AUTH_FAILED",
            Self::Network(_) => "DIRECTORY_FETCH_FAILED",
            Self::Token { .. } => "TOKEN_FETCH_FAILED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::Session { .. } => "SESSION_REJECTED",
            Self::SyncTimeout { .. } => "SYNC_TIMEOUT",
            Self::DoorCommand(_) => "DOOR_COMMAND_REJECTED",
            Self::DoorVerifyTimeout { .. } => "DOOR_VERIFY_TIMEOUT",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for DropoffError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
