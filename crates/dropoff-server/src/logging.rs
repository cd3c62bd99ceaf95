//! Logging setup driven by the `[server]` configuration section.
//!
//! The filter comes from the first of `RUST_LOG`, `DROPOFF_LOG_LEVEL` and
//! `server.log_filter` that is set. With `server.production` on, JSON lines
//! go to daily files under `server.log_dir` and compact lines go to stdout
//! for the journal. Otherwise everything is pretty-printed to stdout.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use dropoff_core::ServerConfig;
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted when `RUST_LOG` is not set.
pub const LOG_LEVEL_ENV: &str = "DROPOFF_LOG_LEVEL";

/// Variables that override `server.log_filter`, strongest first.
const FILTER_OVERRIDES: [&str; 2] = ["RUST_LOG", LOG_LEVEL_ENV];

const FILE_PREFIX: &str = "dropoff";

/// Writer guards for the production sinks. Dropping them loses buffered lines.
static WRITER_GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Install the global subscriber described by `server`.
///
/// # Errors
///
/// Returns an error if the resolved filter does not parse, the log
/// directory cannot be created, or a subscriber is already installed.
pub fn init(server: &ServerConfig) -> anyhow::Result<()> {
    let directive = filter_directive(&server.log_filter, |key| std::env::var(key).ok());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter `{directive}`"))?;
    let registry = tracing_subscriber::registry().with(filter);

    if !server.production {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
            )
            .try_init()?;
        return Ok(());
    }

    let directory = log_directory(server);
    let (file_writer, stdout_writer) = production_writers(&directory)?;
    registry
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .try_init()?;

    info!(directory = %directory.display(), filter = %directive, "File logging enabled");
    Ok(())
}

/// The filter directive to use, given the configured one and an environment
/// lookup. Blank overrides are ignored.
fn filter_directive(configured: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    FILTER_OVERRIDES
        .iter()
        .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| configured.to_string())
}

/// `server.log_dir`, or the platform default when unset.
fn log_directory(server: &ServerConfig) -> PathBuf {
    server.log_dir.clone().unwrap_or_else(default_log_directory)
}

fn default_log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/dropoff")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "dropoff").map_or_else(
            || PathBuf::from("./logs"),
            |dirs| dirs.data_dir().join("logs"),
        )
    }
}

/// Create `directory` and the non-blocking file and stdout writers.
fn production_writers(directory: &Path) -> anyhow::Result<(NonBlocking, NonBlocking)> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, directory, FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    // Only the first install keeps its guards; later ones fail in try_init.
    let _ = WRITER_GUARDS.set((file_guard, stdout_guard));
    Ok((file_writer, stdout_writer))
}
