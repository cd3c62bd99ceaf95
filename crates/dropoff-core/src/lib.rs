//! # dropoff-core
//!
//! Core logic for the dropoff locker tower client.
//!
//! This crate provides:
//! - REST clients for credentials, the locker directory and drop-off tokens
//! - The tower hardware gateway boundary (and a scripted stand-in)
//! - The session coordinator that drives a tower from authentication to
//!   confirmed door opens
//! - Layered configuration loading and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`backend`] - reqwest clients behind the [`LockerBackend`] trait
//! - [`config`] - Configuration loading (TOML + environment) and validation
//! - [`coordinator`] - Session lifecycle, gating, poll loops and cancellation
//! - [`error`] - Unified error types for the crate
//! - [`gateway`] - The [`TowerGateway`] trait the vendor SDK sits behind
//! - [`poll`] - Bounded polling with an owned countdown
//! - [`session`] - Session state and the intent precondition table
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod poll;
pub mod session;
pub mod types;

// Re-export primary types for convenience
pub use backend::{BackendError, BackendResult, HttpBackend, LockerBackend};
pub use config::{
    is_valid_tower_id, BackendConfig, Config, ConfigError, ConfigResult, Credentials,
    DropoffConfig, SdkEnvironment, ServerConfig, SessionConfig, TowerConfig,
};
pub use coordinator::{Coordinator, CoordinatorSettings, Outcome};
pub use error::{DropoffError, Result};
#[cfg(any(test, feature = "mock-gateway"))]
pub use gateway::mock::ScriptedGateway;
pub use gateway::{DiscoveredTower, GatewayError, GatewayResult, SdkLogEvent, TowerGateway};
pub use poll::{BoundedPoll, PollOutcome};
pub use session::{Intent, SessionPhase, SessionState};
pub use types::{AccessTokens, DropoffToken, Locker, LockerId, Notification};
