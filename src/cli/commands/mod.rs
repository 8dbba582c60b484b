//! CLI command implementations
//!
//! Every command returns a process exit code:
//!
//! | Code | Meaning                                        |
//! |------|------------------------------------------------|
//! | 0    | Success                                        |
//! | 1    | Run finished with failed or skipped windows    |
//! | 2    | Configuration or argument error                |
//! | 3    | Another run is active or the cooldown applies  |
//! | 4    | Source or warehouse connection/auth failure    |
//! | 5    | Any other fatal error                          |
//! | 130  | Interrupted by a shutdown signal               |

pub mod backfill;
pub mod coverage;
pub mod export;
pub mod gaps;
pub mod incremental;
pub mod init;
pub mod retention;
pub mod status;
pub mod validate;

use crate::config::{load_config, StrataConfig};
use crate::core::Engine;
use crate::domain::StrataError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_BUSY: i32 = 3;
pub const EXIT_CONNECTION: i32 = 4;
pub const EXIT_FATAL: i32 = 5;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Map an error to the exit code reported for it
pub fn exit_code_for(error: &StrataError) -> i32 {
    match error {
        StrataError::Configuration(_)
        | StrataError::Validation(_)
        | StrataError::InvalidRange(_) => EXIT_CONFIG,
        StrataError::ConcurrentRunRejected | StrataError::CooldownActive { .. } => EXIT_BUSY,
        StrataError::SourceUnavailable(_)
        | StrataError::Authentication(_)
        | StrataError::Database(_) => EXIT_CONNECTION,
        _ => EXIT_FATAL,
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{raw}' is neither an RFC 3339 timestamp nor a YYYY-MM-DD date"))
}

/// Load and validate the configuration
///
/// On failure the error has already been reported and the exit code is
/// returned as the `Err` value.
pub(crate) fn load(config_path: &str) -> Result<StrataConfig, i32> {
    load_config(config_path).map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        eprintln!("❌ {e}");
        EXIT_CONFIG
    })
}

/// Build an engine over the PostgreSQL backends described by `config`
pub(crate) fn build_engine(
    config: &StrataConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<Engine, i32> {
    Engine::from_config(config, shutdown).map_err(|e| {
        tracing::error!(error = %e, "Failed to initialize backends");
        eprintln!("❌ Failed to initialize backends: {e}");
        exit_code_for(&e)
    })
}

/// [`load`] followed by [`build_engine`]
pub(crate) fn open_engine(
    config_path: &str,
    shutdown: watch::Receiver<bool>,
) -> Result<(StrataConfig, Engine), i32> {
    let config = load(config_path)?;
    let engine = build_engine(&config, shutdown)?;
    Ok((config, engine))
}

/// Report an engine error and return its exit code
pub(crate) fn report_error(context: &str, error: &StrataError) -> i32 {
    crate::log_error_with_context!(error, context);
    eprintln!("❌ {context}: {error}");
    exit_code_for(error)
}

/// Print `value` as pretty JSON
pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<i32> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(EXIT_OK)
}

/// Drive `operation` to completion, but once shutdown is signalled give it
/// at most `grace` more time
///
/// Returns `None` when the grace period ran out first.
pub(crate) async fn with_shutdown_grace<F: Future>(
    operation: F,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> Option<F::Output> {
    tokio::pin!(operation);
    tokio::select! {
        output = &mut operation => return Some(output),
        _ = shutdown_requested(&mut shutdown) => {}
    }

    tracing::info!(grace_secs = grace.as_secs(), "Waiting for the current window to finish");
    tokio::time::timeout(grace, operation).await.ok()
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone: no signal can arrive any more
            std::future::pending::<()>().await;
        }
    }
}

/// Format a timestamp for tables, or a dash when absent
pub(crate) fn format_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
