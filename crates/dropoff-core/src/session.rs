//! Session state and the intent precondition table.
//!
//! [`SessionState`] is the single record the coordinator mutates. Everyone
//! else sees clones of it. [`Intent::is_enabled`] is the one place that
//! decides whether a user intent may run against a given state.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::{AccessTokens, Locker, LockerId};

/// Everything known about the current tower session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Bearer token for REST calls; empty when not authenticated.
    #[serde(skip_serializing)]
    pub bearer_token: String,

    /// Token type reported with the bearer token.
    pub token_type: String,

    /// Tower SDK access token; empty when not authenticated.
    #[serde(skip_serializing)]
    pub sdk_token: String,

    /// The gateway has been handed the SDK token and initialized.
    pub sdk_initialized: bool,

    /// A discovery event reported the configured tower.
    pub tower_in_range: bool,

    /// The tower finished syncing after a successful connect.
    pub tower_synced: bool,

    /// The last open attempt confirmed its door open.
    pub can_reopen_last_locker: bool,

    /// Lockers available for drop-off, in directory order.
    pub available_lockers: Vec<Locker>,
}

impl SessionState {
    /// Whether a bearer token is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.bearer_token.is_empty()
    }

    /// Store freshly obtained tokens.
    pub fn apply_tokens(&mut self, tokens: AccessTokens) {
        self.bearer_token = tokens.bearer_token;
        self.token_type = tokens.token_type;
        self.sdk_token = tokens.sdk_token;
    }

    /// Remove the locker with `locker_id`. Returns whether it was present.
    pub fn remove_locker(&mut self, locker_id: LockerId) -> bool {
        let before = self.available_lockers.len();
        self.available_lockers.retain(|locker| locker.id != locker_id);
        self.available_lockers.len() != before
    }

    /// Coarse lifecycle phase derived from the flags.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.tower_synced {
            SessionPhase::Synced
        } else if self.tower_in_range {
            SessionPhase::TowerInRange
        } else if self.sdk_initialized {
            SessionPhase::SdkReady
        } else if self.is_authenticated() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }

    /// Intents whose preconditions hold for this state.
    #[must_use]
    pub fn enabled_intents(&self) -> Vec<Intent> {
        Intent::ALL
            .into_iter()
            .filter(|intent| intent.is_enabled(self))
            .collect()
    }
}

/// Coarse session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No backend tokens yet.
    Unauthenticated,
    /// Tokens obtained, SDK not initialized.
    Authenticated,
    /// SDK initialized; discovery may run.
    SdkReady,
    /// The configured tower was discovered.
    TowerInRange,
    /// Connected and synced; lockers may be opened.
    Synced,
}

/// A user-facing action on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Exchange credentials for tokens.
    Authenticate,
    /// Hand the SDK token to the gateway and initialize it.
    InitializeSdk,
    /// Start radio discovery.
    Discover,
    /// Connect and open a session with the tower.
    Connect,
    /// Terminate the session and reset all state.
    Disconnect,
    /// Reopen the last confirmed locker.
    Reopen,
    /// Refresh the available locker list.
    RefreshLockers,
    /// Open a specific locker.
    OpenLocker,
}

impl Intent {
    /// Every intent, in presentation order.
    pub const ALL: [Self; 8] = [
        Self::Authenticate,
        Self::InitializeSdk,
        Self::Discover,
        Self::Connect,
        Self::Disconnect,
        Self::Reopen,
        Self::RefreshLockers,
        Self::OpenLocker,
    ];

    /// Whether this intent's precondition holds in `state`.
    #[must_use]
    pub fn is_enabled(self, state: &SessionState) -> bool {
        match self {
            Self::Authenticate | Self::Disconnect => true,
            Self::InitializeSdk => !state.sdk_token.is_empty() && !state.sdk_initialized,
            Self::Discover => state.sdk_initialized,
            Self::Connect => state.tower_in_range,
            Self::Reopen => state.can_reopen_last_locker,
            Self::RefreshLockers | Self::OpenLocker => {
                state.is_authenticated() && state.tower_synced
            }
        }
    }

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::InitializeSdk => "initialize_sdk",
            Self::Discover => "discover",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Reopen => "reopen",
            Self::RefreshLockers => "refresh_lockers",
            Self::OpenLocker => "open_locker",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether any of `tower_ids` is `target`, ignoring ASCII case. Stops at the
/// first match.
pub(crate) fn matches_target<'a>(
    mut tower_ids: impl Iterator<Item = &'a str>,
    target: &str,
) -> bool {
    tower_ids.any(|id| id.eq_ignore_ascii_case(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locker(id: LockerId) -> Locker {
        Locker {
            id,
            name: format!("L{id}"),
        }
    }

    fn synced_state() -> SessionState {
        SessionState {
            bearer_token: "bearer".into(),
            token_type: "bearer".into(),
            sdk_token: "sdk".into(),
            sdk_initialized: true,
            tower_in_range: true,
            tower_synced: true,
            can_reopen_last_locker: false,
            available_lockers: vec![locker(1), locker(2)],
        }
    }

    #[test]
    fn test_phase_progression() {
        let mut state = SessionState::default();
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);

        state.bearer_token = "bearer".into();
        assert_eq!(state.phase(), SessionPhase::Authenticated);

        state.sdk_initialized = true;
        assert_eq!(state.phase(), SessionPhase::SdkReady);

        state.tower_in_range = true;
        assert_eq!(state.phase(), SessionPhase::TowerInRange);

        state.tower_synced = true;
        assert_eq!(state.phase(), SessionPhase::Synced);
    }

    #[test]
    fn test_initial_state_enables_only_authenticate_and_disconnect() {
        let enabled = SessionState::default().enabled_intents();
        assert_eq!(enabled, vec![Intent::Authenticate, Intent::Disconnect]);
    }

    #[test]
    fn test_initialize_requires_sdk_token_and_not_initialized() {
        let mut state = SessionState {
            bearer_token: "bearer".into(),
            ..SessionState::default()
        };
        assert!(!Intent::InitializeSdk.is_enabled(&state));

        state.sdk_token = "sdk".into();
        assert!(Intent::InitializeSdk.is_enabled(&state));

        state.sdk_initialized = true;
        assert!(!Intent::InitializeSdk.is_enabled(&state));
    }

    #[test]
    fn test_open_and_refresh_require_synced_session() {
        let mut state = synced_state();
        assert!(Intent::OpenLocker.is_enabled(&state));
        assert!(Intent::RefreshLockers.is_enabled(&state));

        state.tower_synced = false;
        assert!(!Intent::OpenLocker.is_enabled(&state));
        assert!(!Intent::RefreshLockers.is_enabled(&state));
    }

    #[test]
    fn test_remove_locker_is_keyed_by_id() {
        let mut state = synced_state();
        assert!(state.remove_locker(1));
        assert_eq!(state.available_lockers, vec![locker(2)]);
        assert!(!state.remove_locker(1));
        assert_eq!(state.available_lockers, vec![locker(2)]);
    }

    #[test]
    fn test_tokens_are_not_serialized() {
        let json = serde_json::to_string(&synced_state()).unwrap();
        assert!(!json.contains("bearer_token"));
        assert!(!json.contains("sdk_token"));
        assert!(json.contains("\"tower_synced\":true"));
    }

    #[test]
    fn test_matches_target_ignores_case() {
        let target = "00AA11BB22CC33DD";
        assert!(matches_target(["00aa11bb22cc33dd"].into_iter(), target));
        assert!(matches_target(
            ["FFFF000011112222", "00Aa11bB22cC33dD"].into_iter(),
            target
        ));
        assert!(!matches_target(["FFFF000011112222"].into_iter(), target));
        assert!(!matches_target(std::iter::empty(), target));
    }

    #[test]
    fn test_matches_target_iff_some_id_equal() {
        let target = "abcdef0123456789";
        let candidates = [
            vec![],
            vec!["abcdef0123456780"],
            vec!["ABCDEF0123456789"],
            vec!["x", "abcdef0123456789", "ABCDEF0123456789"],
            vec!["abcdef012345678"],
        ];
        for ids in candidates {
            let expected = ids.iter().any(|id| id.to_lowercase() == target);
            assert_eq!(matches_target(ids.iter().copied(), target), expected);
        }
    }
}
