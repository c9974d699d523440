//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Two modes:
//! - **Production** ([`init_production`]): JSON file layer (daily rotation) + console layer
//! - **CLI** ([`init_cli`]): console only
//!
//! Logs always go to stderr so envelopes on stdout stay machine-readable.
//! Pipeline events carry `component`, `kind` and `error_class` fields for
//! log-based counting of fallbacks and failures.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the rotated JSON log.
pub const LOG_FILE_PREFIX: &str = "entity-extraction.log";

/// Holds the non-blocking writer guard for file logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// `RUST_LOG` if set and valid, else `default_directive`.
fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialise production logging.
///
/// Writes JSON logs to `{logs_dir}/entity-extraction.log.YYYY-MM-DD` with
/// daily rotation, plus human-readable output on stderr. Level is taken from
/// `RUST_LOG` (default: `info`).
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise console-only logging on stderr.
///
/// `default_directive` applies when `RUST_LOG` is unset. A second call is a
/// no-op.
pub fn init_cli(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_writer(std::io::stderr)
        .try_init();
}
