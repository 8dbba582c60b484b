//! Logging and observability
//!
//! Structured logging through `tracing`, plus a few macros that keep the
//! field names of recurring export events consistent across modules.

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of an export window
///
/// ```no_run
/// use chrono::{Duration, Utc};
/// use strata::domain::TimeRange;
/// use strata::log_window_start;
///
/// let now = Utc::now();
/// let range = TimeRange::new(now - Duration::days(7), now).unwrap();
/// let window = range.split(Duration::days(7)).unwrap()[0];
/// log_window_start!(&window, 1, "streaming");
/// ```
#[macro_export]
macro_rules! log_window_start {
    ($window:expr, $total:expr, $strategy:expr) => {
        tracing::info!(
            window = $window.index + 1,
            windows_total = $total,
            start = %$window.start.to_rfc3339(),
            end = %$window.end.to_rfc3339(),
            strategy = %$strategy,
            "Exporting window"
        );
    };
}

/// Log a retry attempt
///
/// ```no_run
/// use strata::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, 2000u64, "connection reset");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying operation"
        );
    };
}

/// Log an error with context
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            kind = $error.kind(),
            context = $context,
            "Error occurred"
        );
    };
}
