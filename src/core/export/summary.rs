//! Export run summary and reporting
//!
//! [`ExportRunSummary`] is what a caller gets back from every export
//! operation: counts, per-window failures in window order, and the
//! terminal status.

use crate::core::export::run::{RunStatus, RunTrigger};
use crate::core::sink::BatchFailure;
use crate::core::strategy::WriteStrategy;
use crate::domain::{ExportWindow, StrataError, TimeRange};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A window that did not commit cleanly
#[derive(Debug, Clone, Serialize)]
pub struct WindowFailure {
    pub window_index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `None` when the run failed before a strategy was chosen
    pub strategy: Option<WriteStrategy>,
    pub error_kind: &'static str,
    pub message: String,

    /// Failed streaming batches, empty for bulk and fatal failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub batches: Vec<BatchFailure>,
}

impl WindowFailure {
    pub fn from_error(
        window: &ExportWindow,
        strategy: Option<WriteStrategy>,
        error: &StrataError,
    ) -> Self {
        Self {
            window_index: window.index,
            start: window.start,
            end: window.end,
            strategy,
            error_kind: error.kind(),
            message: error.to_string(),
            batches: Vec::new(),
        }
    }

    pub fn from_batches(window: &ExportWindow, batches: Vec<BatchFailure>) -> Self {
        let records: usize = batches.iter().map(|b| b.records).sum();
        let error_kind = batches.first().map_or("transient_write", |b| b.error_kind);
        Self {
            window_index: window.index,
            start: window.start,
            end: window.end,
            strategy: Some(WriteStrategy::Streaming),
            error_kind,
            message: format!("{} batch(es) with {records} records failed", batches.len()),
            batches,
        }
    }
}

/// Result of one export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportRunSummary {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub range: TimeRange,

    pub windows_total: usize,
    /// Windows processed to the end, failed ones included
    pub windows_done: usize,

    pub records_read: u64,
    /// Records dropped by the entity filter
    pub records_filtered: u64,
    pub records_written: u64,

    /// Failures in window order
    pub errors: Vec<WindowFailure>,

    /// Shutdown was requested before every window ran
    pub interrupted: bool,
    pub dry_run: bool,

    /// Watermark after the run, when one was kept
    pub watermark: Option<DateTime<Utc>>,

    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExportRunSummary {
    pub fn new(run_id: Uuid, trigger: RunTrigger, range: TimeRange, windows_total: usize) -> Self {
        Self {
            run_id,
            trigger,
            status: RunStatus::Running,
            range,
            windows_total,
            windows_done: 0,
            records_read: 0,
            records_filtered: 0,
            records_written: 0,
            errors: Vec::new(),
            interrupted: false,
            dry_run: false,
            watermark: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn windows_failed(&self) -> usize {
        self.errors.len()
    }

    pub fn is_successful(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The failure that halted the run, if it was halted
    pub fn fatal_error(&self) -> Option<&WindowFailure> {
        if self.status == RunStatus::Failed {
            self.errors.last()
        } else {
            None
        }
    }

    /// Terminal status from what happened
    ///
    /// A halting error wins. Otherwise any failed window, or any window left
    /// unprocessed by a shutdown, makes the run partially failed.
    pub fn resolve_status(&self, halted: bool) -> RunStatus {
        if halted {
            RunStatus::Failed
        } else if !self.errors.is_empty() || self.windows_done < self.windows_total {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            trigger = self.trigger.as_str(),
            status = self.status.as_str(),
            windows_total = self.windows_total,
            windows_done = self.windows_done,
            windows_failed = self.windows_failed(),
            records_read = self.records_read,
            records_filtered = self.records_filtered,
            records_written = self.records_written,
            interrupted = self.interrupted,
            dry_run = self.dry_run,
            duration_ms = self.duration_ms,
            "Export run finished"
        );

        for failure in &self.errors {
            tracing::warn!(
                window = failure.window_index,
                start = %failure.start.to_rfc3339(),
                end = %failure.end.to_rfc3339(),
                strategy = ?failure.strategy,
                kind = failure.error_kind,
                message = %failure.message,
                "Window failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn windows() -> (TimeRange, Vec<ExportWindow>) {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, start + Duration::days(21)).unwrap();
        let windows = range.split(Duration::days(7)).unwrap();
        (range, windows)
    }

    #[test]
    fn test_status_resolution() {
        let (range, windows) = windows();
        let mut summary = ExportRunSummary::new(Uuid::new_v4(), RunTrigger::Manual, range, 3);

        summary.windows_done = 3;
        assert_eq!(summary.resolve_status(false), RunStatus::Completed);
        assert_eq!(summary.resolve_status(true), RunStatus::Failed);

        summary.errors.push(WindowFailure::from_error(
            &windows[1],
            Some(WriteStrategy::Bulk),
            &StrataError::Merge("conflict".into()),
        ));
        assert_eq!(summary.resolve_status(false), RunStatus::PartiallyFailed);
    }

    #[test]
    fn test_interrupted_run_is_partial() {
        let (range, _) = windows();
        let mut summary = ExportRunSummary::new(Uuid::new_v4(), RunTrigger::Manual, range, 3);
        summary.windows_done = 1;
        summary.interrupted = true;
        assert_eq!(summary.resolve_status(false), RunStatus::PartiallyFailed);
    }

    #[test]
    fn test_batch_failures_collapse_into_one_window_failure() {
        let (_, windows) = windows();
        let failure = WindowFailure::from_batches(
            &windows[0],
            vec![
                BatchFailure {
                    batch_index: 0,
                    records: 1000,
                    error_kind: "transient_write",
                    message: "timeout".into(),
                },
                BatchFailure {
                    batch_index: 4,
                    records: 250,
                    error_kind: "transient_write",
                    message: "timeout".into(),
                },
            ],
        );
        assert_eq!(failure.error_kind, "transient_write");
        assert_eq!(failure.message, "2 batch(es) with 1250 records failed");
        assert_eq!(failure.batches.len(), 2);
    }

    #[test]
    fn test_fatal_error_only_for_failed_runs() {
        let (range, windows) = windows();
        let mut summary = ExportRunSummary::new(Uuid::new_v4(), RunTrigger::Incremental, range, 3);
        summary.errors.push(WindowFailure::from_error(
            &windows[0],
            None,
            &StrataError::SourceUnavailable("down".into()),
        ));
        summary.status = RunStatus::PartiallyFailed;
        assert!(summary.fatal_error().is_none());
        summary.status = RunStatus::Failed;
        assert_eq!(summary.fatal_error().unwrap().error_kind, "source_unavailable");
    }

    #[test]
    fn test_summary_serializes() {
        let (range, _) = windows();
        let summary = ExportRunSummary::new(Uuid::new_v4(), RunTrigger::Manual, range, 3);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["trigger"], "manual");
        assert_eq!(json["status"], "running");
        assert_eq!(json["windows_total"], 3);
    }
}
