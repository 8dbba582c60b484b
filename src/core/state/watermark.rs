//! Watermark model for incremental exports
//!
//! One watermark exists per export stream (source → warehouse table). Its
//! `last_exported_at` is the end of the longest prefix of windows that all
//! committed cleanly, so an incremental run never skips a failed window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome recorded for the most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    InProgress,
    Completed,
    PartiallyFailed,
    Failed,
    #[default]
    NotStarted,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::InProgress => "in_progress",
            ExportStatus::Completed => "completed",
            ExportStatus::PartiallyFailed => "partially_failed",
            ExportStatus::Failed => "failed",
            ExportStatus::NotStarted => "not_started",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [
            ExportStatus::InProgress,
            ExportStatus::Completed,
            ExportStatus::PartiallyFailed,
            ExportStatus::Failed,
            ExportStatus::NotStarted,
        ]
        .into_iter()
        .find(|s| s.as_str() == raw)
    }
}

/// Persisted export progress for one stream
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use strata::core::state::watermark::{ExportStatus, Watermark};
/// use uuid::Uuid;
///
/// let mut watermark = Watermark::new(Watermark::generate_id("recorder", "public", "sensor_data"));
/// watermark.mark_started(Uuid::new_v4());
///
/// let t = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
/// watermark.advance(t, 1_000);
/// watermark.mark_finished(ExportStatus::Completed);
///
/// assert_eq!(watermark.last_exported_at, Some(t));
/// assert_eq!(watermark.records_exported_count, 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Format: "{source}:{schema}.{table}"
    pub id: String,

    /// Exclusive end of the last contiguous successfully exported range
    pub last_exported_at: Option<DateTime<Utc>>,

    /// Records written across all runs
    pub records_exported_count: u64,

    pub last_run_id: Option<Uuid>,

    pub last_export_started_at: Option<DateTime<Utc>>,

    pub last_export_completed_at: Option<DateTime<Utc>>,

    pub last_export_status: ExportStatus,
}

impl Watermark {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_exported_at: None,
            records_exported_count: 0,
            last_run_id: None,
            last_export_started_at: None,
            last_export_completed_at: None,
            last_export_status: ExportStatus::NotStarted,
        }
    }

    pub fn generate_id(source: &str, schema: &str, table: &str) -> String {
        format!("{source}:{schema}.{table}")
    }

    pub fn is_in_progress(&self) -> bool {
        self.last_export_status == ExportStatus::InProgress
    }

    pub fn mark_started(&mut self, run_id: Uuid) {
        self.last_run_id = Some(run_id);
        self.last_export_started_at = Some(Utc::now());
        self.last_export_completed_at = None;
        self.last_export_status = ExportStatus::InProgress;
    }

    /// Moves the watermark forward; an earlier timestamp is ignored
    pub fn advance(&mut self, exported_until: DateTime<Utc>, records: u64) {
        if self.last_exported_at.map_or(true, |current| exported_until > current) {
            self.last_exported_at = Some(exported_until);
        }
        self.records_exported_count += records;
    }

    pub fn mark_finished(&mut self, status: ExportStatus) {
        self.last_export_completed_at = Some(Utc::now());
        self.last_export_status = status;
    }

    /// Duration of the last finished run
    pub fn last_export_duration(&self) -> Option<chrono::Duration> {
        match (self.last_export_started_at, self.last_export_completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}
