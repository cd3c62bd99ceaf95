//! Tower hardware gateway boundary.
//!
//! The vendor SDK owns the radio link, session crypto and door commands. It
//! is reached only through [`TowerGateway`]:
//! - imperative commands (initialize, discover, connect, open session,
//!   open locker, check door, reopen, terminate)
//! - two broadcast event channels (discovered towers, SDK log lines)
//!
//! Poll primitives ([`TowerGateway::is_syncing`], [`TowerGateway::check_door`])
//! answer once and never retry; retry policy belongs to the coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::SdkEnvironment;
use crate::types::{DropoffToken, LockerId};

#[cfg(any(test, feature = "mock-gateway"))]
pub mod mock;

/// Errors reported by the tower SDK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The radio link could not be established or was lost.
    #[error("transport error: {0}")]
    Transport(String),

    /// The tower refused the session request.
    #[error("session rejected (code {code}): {message}")]
    SessionRejected {
        /// SDK error code.
        code: i32,
        /// SDK error message.
        message: String,
    },

    /// The tower failed to execute a command.
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Result alias for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// A tower reported by a discovery event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredTower {
    /// Tower identifier as broadcast by the tower.
    pub tower_id: String,
    /// Broadcast name, if any.
    pub tower_name: Option<String>,
    /// Signal strength in dBm, if measured.
    pub rssi: Option<i16>,
}

impl DiscoveredTower {
    /// A tower known only by its id.
    #[must_use]
    pub fn with_id(tower_id: impl Into<String>) -> Self {
        Self {
            tower_id: tower_id.into(),
            tower_name: None,
            rssi: None,
        }
    }
}

/// Severity of an SDK log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkLogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Informational.
    Info,
    /// Something unexpected but handled.
    Warning,
    /// An SDK-side failure.
    Error,
}

/// A line from the SDK's log channel. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkLogEvent {
    /// Severity.
    pub level: SdkLogLevel,
    /// Log text.
    pub message: String,
}

/// Command surface of the tower SDK.
#[async_trait]
pub trait TowerGateway: Send + Sync {
    /// Hand the SDK its access token. Must precede [`Self::initialize_sdk`].
    fn set_access_token(&self, token: &str, environment: SdkEnvironment);

    /// Initialize the SDK. Must be called once, after the access token.
    fn initialize_sdk(&self);

    /// Start radio discovery. Results arrive on [`Self::discovery_events`].
    fn start_discovery(&self);

    /// Subscribe to discovery events. Each event is one batch of towers.
    fn discovery_events(&self) -> broadcast::Receiver<Vec<DiscoveredTower>>;

    /// Subscribe to SDK log lines.
    fn log_events(&self) -> broadcast::Receiver<SdkLogEvent>;

    /// Establish a radio connection to `tower_id`.
    async fn connect(&self, tower_id: &str) -> GatewayResult<()>;

    /// Open an authenticated session with the connected tower.
    ///
    /// The tower's refusal is reported as [`GatewayError::SessionRejected`].
    async fn open_session(&self, role: u8) -> GatewayResult<()>;

    /// Whether the tower is still syncing. One poll, no retry.
    async fn is_syncing(&self) -> bool;

    /// Send an open command. `None` means the tower did not open anything.
    async fn send_open_command(&self, token: &DropoffToken) -> GatewayResult<Option<LockerId>>;

    /// Whether the last opened door reports open. One poll, no retry.
    async fn check_door(&self) -> bool;

    /// Reopen the last opened locker.
    fn reopen_last(&self);

    /// Terminate the current session.
    fn terminate_session(&self, code: i32, reason: &str);
}
