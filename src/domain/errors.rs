//! Domain error types
//!
//! This module defines the error hierarchy for Strata. Adapter code converts
//! driver and pool errors into these variants so that callers never see
//! third-party error types, and the export coordinator can decide from the
//! variant alone whether a failure is retried, fatal to a window, or fatal
//! to the whole run.

use thiserror::Error;

/// Main Strata error type
///
/// This is the primary error type used throughout the library.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The source record store cannot be reached or queried
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Credentials were rejected by the source or the warehouse
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A warehouse write failed in a way that may succeed on retry
    #[error("Transient write error: {0}")]
    TransientWrite(String),

    /// Loading the staging artifact into the warehouse failed
    #[error("Bulk load failed: {0}")]
    BulkLoad(String),

    /// Merging the staging area into the target table failed
    #[error("Merge failed: {0}")]
    Merge(String),

    /// Another export run is already in progress
    #[error("An export run is already in progress")]
    ConcurrentRunRejected,

    /// The previous run finished too recently
    #[error("Export cooldown active, retry in {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },

    /// The requested time range was rejected before any I/O
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Database errors that are neither transient nor authentication related
    #[error("Database error: {0}")]
    Database(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Export state persistence errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl StrataError {
    /// Returns true for failures the streaming path retries with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, StrataError::TransientWrite(_))
    }

    /// Returns true for failures that abort a single window but let the run continue
    pub fn is_window_failure(&self) -> bool {
        matches!(self, StrataError::BulkLoad(_) | StrataError::Merge(_))
    }

    /// Returns true for failures that halt the remaining windows of a run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StrataError::SourceUnavailable(_)
                | StrataError::Authentication(_)
                | StrataError::Configuration(_)
                | StrataError::Database(_)
                | StrataError::State(_)
        )
    }

    /// Short machine-friendly name of the error kind, used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            StrataError::Configuration(_) => "configuration",
            StrataError::SourceUnavailable(_) => "source_unavailable",
            StrataError::Authentication(_) => "auth_error",
            StrataError::TransientWrite(_) => "transient_write",
            StrataError::BulkLoad(_) => "bulk_load_failure",
            StrataError::Merge(_) => "merge_failure",
            StrataError::ConcurrentRunRejected => "concurrent_run_rejected",
            StrataError::CooldownActive { .. } => "cooldown_active",
            StrataError::InvalidRange(_) => "invalid_range",
            StrataError::Database(_) => "database",
            StrataError::Validation(_) => "validation",
            StrataError::State(_) => "state",
            StrataError::Serialization(_) => "serialization",
            StrataError::Io(_) => "io",
            StrataError::Other(_) => "other",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        StrataError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for StrataError {
    fn from(err: toml::de::Error) -> Self {
        StrataError::Configuration(format!("TOML parse error: {err}"))
    }
}
