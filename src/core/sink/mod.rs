//! Warehouse writes
//!
//! [`SinkWriter`] moves a window's enriched records into the warehouse by
//! one of two paths:
//!
//! - **Streaming**: fixed-size batches, each a single upsert, retried with
//!   backoff on transient failures.
//! - **Bulk**: an NDJSON staging artifact loaded into a staging table and
//!   merged into the target in one statement. The staging table and the
//!   artifact are removed whatever the outcome.
//!
//! Both paths are idempotent: re-writing a record replaces the row with the
//! same `(entity_id, changed_at)`.

pub mod retry;
pub mod staging;

use crate::adapters::database::traits::Warehouse;
use crate::config::ExportConfig;
use crate::core::export::run::RunPhase;
use crate::domain::{EnrichedRecord, Result, StrataError};
use futures::stream::BoxStream;
use futures::StreamExt;
use retry::RetryPolicy;
use serde::Serialize;
use staging::{ensure_space, StagingArtifact};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Callback receiving phase changes
pub type ProgressFn = Arc<dyn Fn(RunPhase) + Send + Sync>;

/// A streaming batch that could not be written
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub records: usize,
    pub error_kind: &'static str,
    pub message: String,
}

/// Result of writing one window
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteOutcome {
    /// Distinct rows inserted or updated; records sharing a key within one
    /// batch or staging artifact count once. A dry run counts the records
    /// it would have sent.
    pub records_written: u64,
    pub batches_written: usize,
    pub failed_batches: Vec<BatchFailure>,

    /// Shutdown was requested before the window was fully written
    pub interrupted: bool,
}

impl WriteOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed_batches.is_empty() && !self.interrupted
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Keep credential problems as they are; anything else fails the window
fn into_bulk_error(err: StrataError) -> StrataError {
    match err {
        StrataError::Authentication(_) | StrataError::BulkLoad(_) | StrataError::Merge(_) => err,
        other => StrataError::BulkLoad(other.to_string()),
    }
}

/// Writes enriched records to a [`Warehouse`]
#[derive(Clone)]
pub struct SinkWriter {
    warehouse: Arc<dyn Warehouse>,
    retry: RetryPolicy,
    batch_size: usize,
    staging_dir: Option<PathBuf>,
    dry_run: bool,
    progress: Option<ProgressFn>,
}

impl SinkWriter {
    pub fn new(warehouse: Arc<dyn Warehouse>, config: &ExportConfig, staging_dir: Option<PathBuf>) -> Self {
        Self {
            warehouse,
            retry: RetryPolicy::from_config(&config.retry),
            batch_size: config.batch_size.max(1),
            staging_dir,
            dry_run: config.dry_run,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    fn report(&self, phase: RunPhase) {
        if let Some(progress) = &self.progress {
            progress(phase);
        }
    }

    /// Pull up to `batch_size` records; source errors end the window
    async fn next_batch(
        &self,
        records: &mut BoxStream<'_, Result<EnrichedRecord>>,
    ) -> Result<Vec<EnrichedRecord>> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match records.next().await {
                Some(record) => batch.push(record?),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Upsert records in batches
    ///
    /// # Errors
    ///
    /// Returns the error for source failures and for failures that make
    /// further writes pointless (rejected credentials, structural database
    /// errors). Exhausted transient retries are recorded in the outcome and
    /// the remaining batches are still attempted.
    pub async fn write_streaming(
        &self,
        mut records: BoxStream<'_, Result<EnrichedRecord>>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::default();
        let mut batch_index = 0;

        loop {
            if shutdown_requested(shutdown) {
                outcome.interrupted = true;
                break;
            }

            let batch = self.next_batch(&mut records).await?;
            if batch.is_empty() {
                break;
            }

            if self.dry_run {
                tracing::info!(batch = batch_index, count = batch.len(), "DRY RUN: would upsert batch");
                outcome.records_written += batch.len() as u64;
                outcome.batches_written += 1;
                batch_index += 1;
                continue;
            }

            let warehouse = &self.warehouse;
            let result = self.retry.run(|| warehouse.upsert_batch(&batch)).await;

            match result {
                Ok(affected) => {
                    outcome.records_written += affected;
                    outcome.batches_written += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        batch = batch_index,
                        records = batch.len(),
                        kind = e.kind(),
                        error = %e,
                        "Batch write failed"
                    );
                    outcome.failed_batches.push(BatchFailure {
                        batch_index,
                        records: batch.len(),
                        error_kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
            batch_index += 1;
        }

        Ok(outcome)
    }

    /// Stage, load, and merge a whole window
    ///
    /// # Errors
    ///
    /// `BulkLoad` if staging or loading fails, `Merge` if the merge fails;
    /// either leaves the target untouched. `Authentication` and source
    /// errors are passed through.
    pub async fn write_bulk(
        &self,
        mut records: BoxStream<'_, Result<EnrichedRecord>>,
        estimated_records: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::default();

        if self.dry_run {
            loop {
                let batch = self.next_batch(&mut records).await?;
                if batch.is_empty() {
                    break;
                }
                outcome.records_written += batch.len() as u64;
            }
            tracing::info!(count = outcome.records_written, "DRY RUN: would bulk load window");
            return Ok(outcome);
        }

        let dir = self.staging_dir.clone().unwrap_or_else(std::env::temp_dir);
        ensure_space(&dir, estimated_records)?;

        // Dropping the artifact on any early return deletes the file
        let mut artifact = StagingArtifact::create(Some(&dir))?;
        loop {
            if shutdown_requested(shutdown) {
                tracing::info!("Shutdown requested, abandoning bulk window before load");
                outcome.interrupted = true;
                return Ok(outcome);
            }
            let batch = self.next_batch(&mut records).await?;
            if batch.is_empty() {
                break;
            }
            artifact.append(batch).await?;
        }

        if artifact.records() == 0 {
            artifact.close()?;
            return Ok(outcome);
        }

        let checksum = artifact.checksum().await?;
        tracing::info!(
            records = artifact.records(),
            bytes = artifact.bytes(),
            sha256 = %checksum,
            "Staging artifact written"
        );

        let result = self.load_and_merge(&artifact).await;

        if let Err(e) = artifact.close() {
            tracing::warn!(error = %e, "Failed to remove staging artifact");
        }

        outcome.records_written = result?;
        outcome.batches_written = 1;
        Ok(outcome)
    }

    /// Create, load, merge, and always drop the staging area
    ///
    /// Returns the number of rows the merge touched.
    async fn load_and_merge(&self, artifact: &StagingArtifact) -> Result<u64> {
        let path = artifact
            .path()
            .ok_or_else(|| StrataError::BulkLoad("Staging artifact already closed".to_string()))?
            .to_path_buf();

        self.report(RunPhase::Uploading);
        let area = self
            .warehouse
            .create_staging_area()
            .await
            .map_err(into_bulk_error)?;

        let result = match self.warehouse.load_staging(&area, &path).await {
            Ok(loaded) => {
                tracing::debug!(staging = %area.name, loaded, "Staging area loaded");
                self.report(RunPhase::Merging);
                self.warehouse
                    .merge_staging(&area)
                    .await
                    .map_err(|e| match e {
                        StrataError::Authentication(_) => e,
                        StrataError::Merge(_) => e,
                        other => StrataError::Merge(other.to_string()),
                    })
            }
            Err(e) => Err(into_bulk_error(e)),
        };

        if let Err(e) = self.warehouse.drop_staging_area(&area).await {
            tracing::warn!(staging = %area.name, error = %e, "Failed to drop staging area");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryWarehouse;
    use crate::config::RetryConfig;
    use crate::core::enrich::FeatureExtractor;
    use crate::domain::{EntityId, RawRecord};
    use chrono::{Duration, TimeZone, Utc};
    use futures::stream;
    use std::sync::Mutex;

    fn config(batch_size: usize) -> ExportConfig {
        ExportConfig {
            batch_size,
            retry: RetryConfig {
                max_retries: 2,
                initial_delay_ms: 0,
                max_delay_ms: 0,
                backoff_multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    fn records(n: i64) -> Vec<EnrichedRecord> {
        let extractor = FeatureExtractor::new(Utc::now());
        let base = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let raw = RawRecord::new(
                    EntityId::new(format!("sensor.s{}", i % 4)).unwrap(),
                    i.to_string(),
                    base + Duration::minutes(i),
                );
                extractor.enrich(&raw)
            })
            .collect()
    }

    fn stream_of(records: Vec<EnrichedRecord>) -> BoxStream<'static, Result<EnrichedRecord>> {
        stream::iter(records.into_iter().map(Ok)).boxed()
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_streaming_writes_in_batches() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let writer = SinkWriter::new(warehouse.clone(), &config(10), None);

        let outcome = writer.write_streaming(stream_of(records(25)), &no_shutdown()).await.unwrap();
        assert_eq!(outcome.records_written, 25);
        assert_eq!(outcome.batches_written, 3);
        assert!(outcome.is_clean());
        assert_eq!(warehouse.row_count(), 25);
        assert_eq!(warehouse.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_streaming_retries_transient_failures() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.fail_next_upserts(2);
        let writer = SinkWriter::new(warehouse.clone(), &config(100), None);

        let outcome = writer.write_streaming(stream_of(records(5)), &no_shutdown()).await.unwrap();
        assert!(outcome.is_clean());
        assert_eq!(warehouse.row_count(), 5);
        assert_eq!(warehouse.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_streaming_records_exhausted_batch_and_continues() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        // First batch: initial attempt plus two retries
        warehouse.fail_next_upserts(3);
        let writer = SinkWriter::new(warehouse.clone(), &config(10), None);

        let outcome = writer.write_streaming(stream_of(records(20)), &no_shutdown()).await.unwrap();
        assert_eq!(outcome.failed_batches.len(), 1);
        assert_eq!(outcome.failed_batches[0].batch_index, 0);
        assert_eq!(outcome.failed_batches[0].error_kind, "transient_write");
        assert_eq!(outcome.records_written, 10);
        assert_eq!(warehouse.row_count(), 10);
    }

    #[tokio::test]
    async fn test_streaming_aborts_on_auth_error() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.reject_credentials(true);
        let writer = SinkWriter::new(warehouse.clone(), &config(10), None);

        let err = writer
            .write_streaming(stream_of(records(20)), &no_shutdown())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Authentication(_)));
        assert_eq!(warehouse.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn test_streaming_stops_at_batch_boundary_on_shutdown() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let writer = SinkWriter::new(warehouse.clone(), &config(10), None);
        let (tx, rx) = watch::channel(true);

        let outcome = writer.write_streaming(stream_of(records(20)), &rx).await.unwrap();
        drop(tx);
        assert!(outcome.interrupted);
        assert_eq!(warehouse.row_count(), 0);
    }

    #[tokio::test]
    async fn test_bulk_loads_and_merges() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let dir = tempfile::tempdir().unwrap();
        let phases = Arc::new(Mutex::new(Vec::new()));
        let seen = phases.clone();
        let writer = SinkWriter::new(warehouse.clone(), &config(7), Some(dir.path().to_path_buf()))
            .with_progress(Arc::new(move |phase| seen.lock().unwrap().push(phase)));

        let outcome = writer
            .write_bulk(stream_of(records(30)), 30, &no_shutdown())
            .await
            .unwrap();
        assert_eq!(outcome.records_written, 30);
        assert_eq!(warehouse.row_count(), 30);
        assert_eq!(warehouse.open_staging_areas(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(*phases.lock().unwrap(), vec![RunPhase::Uploading, RunPhase::Merging]);
    }

    #[tokio::test]
    async fn test_written_counts_collapse_duplicate_keys() {
        let duplicated = || {
            let mut all = records(30);
            all.extend(records(10));
            all
        };
        let dir = tempfile::tempdir().unwrap();

        let warehouse = Arc::new(MemoryWarehouse::new());
        let writer = SinkWriter::new(warehouse.clone(), &config(100), Some(dir.path().to_path_buf()));
        let bulk = writer
            .write_bulk(stream_of(duplicated()), 40, &no_shutdown())
            .await
            .unwrap();
        assert_eq!(bulk.records_written, 30);
        assert_eq!(warehouse.row_count(), 30);

        let warehouse = Arc::new(MemoryWarehouse::new());
        let writer = SinkWriter::new(warehouse.clone(), &config(100), None);
        let streamed = writer
            .write_streaming(stream_of(duplicated()), &no_shutdown())
            .await
            .unwrap();
        assert_eq!(streamed.records_written, 30);
        assert_eq!(warehouse.row_count(), 30);
    }

    #[tokio::test]
    async fn test_bulk_load_failure_cleans_up() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.fail_load(true);
        let dir = tempfile::tempdir().unwrap();
        let writer = SinkWriter::new(warehouse.clone(), &config(10), Some(dir.path().to_path_buf()));

        let err = writer
            .write_bulk(stream_of(records(15)), 15, &no_shutdown())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::BulkLoad(_)));
        assert_eq!(warehouse.staging_areas_created(), 1);
        assert_eq!(warehouse.open_staging_areas(), 0);
        assert_eq!(warehouse.row_count(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_bulk_merge_failure_cleans_up() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.fail_merge(true);
        let dir = tempfile::tempdir().unwrap();
        let writer = SinkWriter::new(warehouse.clone(), &config(10), Some(dir.path().to_path_buf()));

        let err = writer
            .write_bulk(stream_of(records(15)), 15, &no_shutdown())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Merge(_)));
        assert_eq!(warehouse.open_staging_areas(), 0);
        assert_eq!(warehouse.row_count(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let mut cfg = config(10);
        cfg.dry_run = true;
        let writer = SinkWriter::new(warehouse.clone(), &cfg, None);

        let streamed = writer.write_streaming(stream_of(records(12)), &no_shutdown()).await.unwrap();
        let bulk = writer.write_bulk(stream_of(records(12)), 12, &no_shutdown()).await.unwrap();
        assert_eq!(streamed.records_written, 12);
        assert_eq!(bulk.records_written, 12);
        assert_eq!(warehouse.row_count(), 0);
        assert_eq!(warehouse.upsert_calls(), 0);
        assert_eq!(warehouse.staging_areas_created(), 0);
    }
}
