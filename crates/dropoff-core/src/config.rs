//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//! 1. Built-in defaults (serde defaults on every section)
//! 2. A TOML file (explicit path, or the platform default if present)
//! 3. Environment variables such as `DROPOFF__TOWER__ID`
//!
//! It is loaded once before the coordinator is built and never re-read
//! during a session.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, FileFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable that points at the configuration file.
pub const CONFIG_PATH_ENV: &str = "DROPOFF_CONFIG";

/// Prefix and section separator for environment overrides.
const ENV_PREFIX: &str = "DROPOFF";
const ENV_SEPARATOR: &str = "__";

/// Session role requested from the tower (developer role).
pub const DEVELOPER_ROLE: u8 = 5;

static TOWER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{16}$").expect("tower id pattern is valid"));

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A single field failed validation.
    #[error("invalid {field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Token backend settings.
    pub backend: BackendConfig,
    /// Target tower.
    pub tower: TowerConfig,
    /// Session tunables.
    pub session: SessionConfig,
    /// Drop-off token request settings.
    pub dropoff: DropoffConfig,
    /// HTTP shell settings.
    pub server: ServerConfig,
}

/// Token backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the REST API.
    pub base_url: Url,

    /// Per-request timeout.
    pub request_timeout_secs: u64,

    /// User label sent when authorizing SDK usage.
    pub authorize_user_id: String,

    /// Application credentials.
    pub credentials: Credentials,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.sandbox.harborlockers.com/api/v1/")
                .expect("default base url is valid"),
            request_timeout_secs: 15,
            authorize_user_id: "dropoff".to_string(),
            credentials: Credentials::default(),
        }
    }
}

/// Credentials exchanged for a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum Credentials {
    /// Account login.
    Password {
        /// Account user name.
        username: String,
        /// Account password.
        #[serde(skip_serializing, default)]
        password: String,
    },
    /// Application client login.
    ClientCredentials {
        /// Client identifier.
        client_id: String,
        /// Client secret.
        #[serde(skip_serializing, default)]
        client_secret: String,
    },
}

impl Default for Credentials {
    fn default() -> Self {
        Self::ClientCredentials {
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

impl Credentials {
    /// Value sent as `grant_type`.
    #[must_use]
    pub const fn grant_type(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::ClientCredentials { .. } => "client_credentials",
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            Self::Password { username, password } => !username.is_empty() && !password.is_empty(),
            Self::ClientCredentials {
                client_id,
                client_secret,
            } => !client_id.is_empty() && !client_secret.is_empty(),
        }
    }
}

/// Target tower.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TowerConfig {
    /// Tower identifier, 16 hexadecimal digits.
    pub id: String,

    /// Tower SDK environment.
    pub sdk_environment: SdkEnvironment,
}

/// Tower SDK environment name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkEnvironment {
    /// Sandbox environment.
    #[default]
    Sandbox,
    /// Development environment.
    Development,
    /// Production environment.
    Production,
}

impl SdkEnvironment {
    /// Name passed to the SDK.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for SdkEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Role requested when opening a session.
    pub role: u8,

    /// Polls allowed while waiting for the tower to sync.
    pub sync_timeout_ticks: u32,

    /// Polls allowed while waiting for a door to report open.
    pub door_timeout_ticks: u32,

    /// Delay between polls.
    pub poll_interval_ms: u64,

    /// Reason sent with a user-initiated terminate.
    pub terminate_reason: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: DEVELOPER_ROLE,
            sync_timeout_ticks: 30,
            door_timeout_ticks: 6,
            poll_interval_ms: 1000,
            terminate_reason: "Session terminated by user".to_string(),
        }
    }
}

impl SessionConfig {
    /// Delay between polls as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Drop-off token request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropoffConfig {
    /// Free-form client description sent with token requests.
    pub client_info: String,

    /// Requested token lifetime.
    pub token_duration_secs: u32,
}

impl Default for DropoffConfig {
    fn default() -> Self {
        Self {
            client_info: "demo open locker".to_string(),
            token_duration_secs: 3000,
        }
    }
}

/// HTTP shell settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the shell listens on.
    pub listen_addr: SocketAddr,

    /// Use production logging (JSON files + compact stdout).
    pub production: bool,

    /// Number of notifications kept for the shell.
    pub notification_capacity: usize,

    /// Directory for rolling log files in production. Defaults to a
    /// platform location when unset.
    pub log_dir: Option<PathBuf>,

    /// `tracing` filter used when neither `RUST_LOG` nor
    /// `DROPOFF_LOG_LEVEL` is set.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            production: false,
            notification_capacity: 50,
            log_dir: None,
            log_filter: "info,tower_http=debug".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location) and the
    /// environment, then validate it.
    ///
    /// An explicit `path` must exist. The default location is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or the
    /// result fails validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, env_source())
    }

    /// Load using the path from `DROPOFF_CONFIG`, if set.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from_env() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load(path.as_deref())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> ConfigResult<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                File::from(path).format(FileFormat::Toml).required(true)
            }
            None => File::from(default_config_path())
                .format(FileFormat::Toml)
                .required(false),
        };

        let config: Self = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section, collecting all failures.
    ///
    /// # Errors
    ///
    /// Returns the single failure, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if !is_valid_tower_id(&self.tower.id) {
            invalid("tower.id", "must be 16 hexadecimal digits");
        }
        if !self.backend.credentials.is_complete() {
            invalid("backend.credentials", "identifier and secret are required");
        }
        if self.backend.request_timeout_secs == 0 {
            invalid("backend.request_timeout_secs", "must be at least 1");
        }
        if self.session.sync_timeout_ticks == 0 {
            invalid("session.sync_timeout_ticks", "must be at least 1");
        }
        if self.session.door_timeout_ticks == 0 {
            invalid("session.door_timeout_ticks", "must be at least 1");
        }
        if self.session.poll_interval_ms == 0 {
            invalid("session.poll_interval_ms", "must be at least 1");
        }
        if self.server.notification_capacity == 0 {
            invalid("server.notification_capacity", "must be at least 1");
        }
        if self.server.log_filter.trim().is_empty() {
            invalid("server.log_filter", "must not be empty");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Whether `id` looks like a tower identifier (16 hexadecimal digits).
#[must_use]
pub fn is_valid_tower_id(id: &str) -> bool {
    TOWER_ID_RE.is_match(id)
}

/// Default configuration file path.
///
/// On Linux: `/etc/dropoff/config.toml`. Elsewhere: the platform config dir.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/dropoff/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "dropoff").map_or_else(
            || PathBuf::from("dropoff.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

fn env_source() -> Environment {
    // No try_parsing: tower ids made of digits only must stay strings.
    Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[backend]
base_url = "http://localhost:9000/api/v1/"

[backend.credentials]
grant_type = "client_credentials"
client_id = "demo-client"
client_secret = "s3cret"

[tower]
id = "00AA11BB22CC33DD"
sdk_environment = "development"

[session]
door_timeout_ticks = 4
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        env_source().source(Some(map))
    }

    #[test]
    fn test_load_file_applies_defaults() {
        let file = write_config(VALID_TOML);
        let config = Config::load_with_env(Some(file.path()), env_with(&[])).unwrap();

        assert_eq!(config.tower.id, "00AA11BB22CC33DD");
        assert_eq!(config.tower.sdk_environment, SdkEnvironment::Development);
        assert_eq!(config.session.door_timeout_ticks, 4);
        assert_eq!(config.session.sync_timeout_ticks, 30);
        assert_eq!(config.session.role, DEVELOPER_ROLE);
        assert_eq!(config.session.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.dropoff.token_duration_secs, 3000);
        assert_eq!(config.backend.credentials.grant_type(), "client_credentials");
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(VALID_TOML);
        let env = env_with(&[
            ("DROPOFF__TOWER__ID", "FFFFEEEEDDDDCCCC"),
            ("DROPOFF__SESSION__SYNC_TIMEOUT_TICKS", "10"),
        ]);
        let config = Config::load_with_env(Some(file.path()), env).unwrap();

        assert_eq!(config.tower.id, "FFFFEEEEDDDDCCCC");
        assert_eq!(config.session.sync_timeout_ticks, 10);
    }

    #[test]
    fn test_password_credentials() {
        let toml = VALID_TOML.replace(
            "grant_type = \"client_credentials\"\nclient_id = \"demo-client\"\nclient_secret = \"s3cret\"",
            "grant_type = \"password\"\nusername = \"me@example.com\"\npassword = \"hunter2\"",
        );
        let file = write_config(&toml);
        let config = Config::load_with_env(Some(file.path()), env_with(&[])).unwrap();

        assert_eq!(
            config.backend.credentials,
            Credentials::Password {
                username: "me@example.com".into(),
                password: "hunter2".into(),
            }
        );
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load_with_env(
            Some(Path::new("/nonexistent/dropoff.toml")),
            env_with(&[]),
        );
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let config = Config::default();
        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                let text: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert!(text.iter().any(|e| e.contains("tower.id")));
                assert!(text.iter().any(|e| e.contains("backend.credentials")));
            }
            other => panic!("expected multiple validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_server_log_settings() {
        let file = write_config(VALID_TOML);
        let config = Config::load_with_env(Some(file.path()), env_with(&[])).unwrap();
        assert_eq!(config.server.log_dir, None);
        assert_eq!(config.server.log_filter, "info,tower_http=debug");

        let env = env_with(&[
            ("DROPOFF__SERVER__LOG_DIR", "/srv/dropoff/logs"),
            ("DROPOFF__SERVER__LOG_FILTER", "dropoff_core=trace"),
        ]);
        let config = Config::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.server.log_dir, Some(PathBuf::from("/srv/dropoff/logs")));
        assert_eq!(config.server.log_filter, "dropoff_core=trace");

        let env = env_with(&[("DROPOFF__SERVER__LOG_FILTER", " ")]);
        let result = Config::load_with_env(Some(file.path()), env);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError { ref field, .. }) if field == "server.log_filter"
        ));
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let file = write_config(VALID_TOML);
        let env = env_with(&[("DROPOFF__SESSION__DOOR_TIMEOUT_TICKS", "0")]);
        let result = Config::load_with_env(Some(file.path()), env);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError { ref field, .. }) if field == "session.door_timeout_ticks"
        ));
    }

    #[test]
    fn test_is_valid_tower_id() {
        assert!(is_valid_tower_id("00AA11BB22CC33DD"));
        assert!(is_valid_tower_id("00aa11bb22cc33dd"));
        assert!(!is_valid_tower_id("00AA11BB22CC33D"));
        assert!(!is_valid_tower_id("00AA11BB22CC33DDE"));
        assert!(!is_valid_tower_id("00AA11BB22CC33DG"));
        assert!(!is_valid_tower_id(""));
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let credentials = Credentials::ClientCredentials {
            client_id: "demo-client".into(),
            client_secret: "s3cret".into(),
        };
        let json = serde_json::to_string(&credentials).unwrap();
        assert!(json.contains("\"grant_type\":\"client_credentials\""));
        assert!(!json.contains("s3cret"));
    }
}
