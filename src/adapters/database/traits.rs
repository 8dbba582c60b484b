//! Storage abstraction traits
//!
//! The engine talks to three seams: the recorder it reads from
//! ([`RecordSource`]), the warehouse it writes to ([`Warehouse`]), and the
//! store that keeps the incremental-export watermark ([`StateStorage`]).
//! PostgreSQL and in-memory implementations live in sibling modules.

use crate::core::state::watermark::Watermark;
use crate::domain::{EnrichedRecord, RawRecord, Result, TimeRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Keyset position after the last row of a page
///
/// `row_id` breaks ties between rows sharing a `changed_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub changed_at: DateTime<Utc>,
    pub row_id: i64,
}

/// One page of source rows in `(changed_at, row_id)` order
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub records: Vec<RawRecord>,

    /// Cursor to resume from, `None` when this is the last page
    pub next: Option<PageCursor>,
}

/// Time span and approximate size of a record set
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RangeSummary {
    pub min_ts: Option<DateTime<Utc>>,
    pub max_ts: Option<DateTime<Utc>>,

    /// Approximate row count; never treat as exact
    pub count_estimate: u64,
}

impl RangeSummary {
    pub fn new(min_ts: DateTime<Utc>, max_ts: DateTime<Utc>, count_estimate: u64) -> Self {
        Self {
            min_ts: Some(min_ts),
            max_ts: Some(max_ts),
            count_estimate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_ts.is_none() || self.max_ts.is_none()
    }

    /// Span between the first and last record in fractional days
    pub fn days(&self) -> f64 {
        match (self.min_ts, self.max_ts) {
            (Some(min), Some(max)) if max > min => (max - min).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        }
    }
}

/// Name of a transient, uniquely named staging table in the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    pub name: String,
}

/// Read access to the recorder's state history
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Test the source connection
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` or `Authentication` if the store cannot be used.
    async fn test_connection(&self) -> Result<()>;

    /// Fetch up to `limit` rows with `changed_at` in `range`, strictly after `after`
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` if the store cannot be reached. Callers
    /// must not retry this internally.
    async fn fetch_page(
        &self,
        range: &TimeRange,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<SourcePage>;

    /// Cheap summary of the whole history, or of `range` when given
    async fn summary(&self, range: Option<&TimeRange>) -> Result<RangeSummary>;

    /// Approximate number of rows in `range`, without scanning them
    async fn count_estimate(&self, range: &TimeRange) -> Result<u64>;

    /// Approximate number of distinct entities with rows in `range`
    async fn entity_estimate(&self, range: &TimeRange) -> Result<u64>;
}

/// Write access to the analytical warehouse
///
/// Every write is an upsert keyed on `(entity_id, changed_at)`.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Test the warehouse connection
    async fn test_connection(&self) -> Result<()>;

    /// Create the target and state tables if they do not exist
    async fn ensure_schema(&self) -> Result<()>;

    /// Make sure storage (partitions) exists for rows in `range`
    async fn prepare_range(&self, range: &TimeRange) -> Result<()>;

    /// Insert-or-update one batch, returning the number of rows affected
    ///
    /// # Errors
    ///
    /// `TransientWrite` for retryable failures, `Authentication` for
    /// rejected credentials, `Database` for anything structural.
    async fn upsert_batch(&self, records: &[EnrichedRecord]) -> Result<u64>;

    /// Create an empty, uniquely named staging area
    async fn create_staging_area(&self) -> Result<StagingArea>;

    /// Load an NDJSON staging artifact into `area`
    ///
    /// # Errors
    ///
    /// `BulkLoad` if the artifact cannot be loaded.
    async fn load_staging(&self, area: &StagingArea, artifact: &Path) -> Result<u64>;

    /// Merge `area` into the target table in one statement
    ///
    /// # Errors
    ///
    /// `Merge` if the statement fails; nothing is committed in that case.
    async fn merge_staging(&self, area: &StagingArea) -> Result<u64>;

    /// Drop `area`; dropping an area that no longer exists succeeds
    async fn drop_staging_area(&self, area: &StagingArea) -> Result<()>;

    /// Time span and approximate size of what the warehouse already holds
    async fn summary(&self) -> Result<RangeSummary>;
}

/// Watermark persistence for incremental exports
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load a watermark, `Ok(None)` when no export has completed yet
    async fn load_watermark(&self, id: &str) -> Result<Option<Watermark>>;

    /// Upsert a watermark
    async fn save_watermark(&self, watermark: &Watermark) -> Result<()>;
}
