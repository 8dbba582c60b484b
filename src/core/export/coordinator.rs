//! Export coordinator - main orchestrator for the export process
//!
//! A run validates and splits the requested range, then processes windows
//! strictly in ascending order. Each window is estimated, assigned a write
//! strategy, streamed from the source, filtered, enriched, and handed to the
//! [`SinkWriter`]. Window-level failures are recorded and the run moves on;
//! source, credential, and structural database failures halt it.

use crate::config::ExportConfig;
use crate::core::enrich::FeatureExtractor;
use crate::core::export::run::{
    lock, report_phase, RunGuard, RunPhase, RunStatus, RunTrigger, SharedScheduler,
};
use crate::core::export::summary::{ExportRunSummary, WindowFailure};
use crate::core::filter::EntityFilter;
use crate::core::sink::{SinkWriter, WriteOutcome};
use crate::core::source::SourceReader;
use crate::core::state::{StateManager, Watermark};
use crate::core::strategy::WriteStrategy;
use crate::domain::{ExportWindow, Result, StrataError, TimeRange};
use crate::log_window_start;
use chrono::{DateTime, Duration, Utc};
use futures::{future, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Parameters of a manual export
///
/// An explicit `start` wins over `days_back`; `end` defaults to now.
#[derive(Debug, Clone, Default)]
pub struct ManualExport {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub days_back: Option<u32>,

    /// `Some(true)` forces bulk, `Some(false)` forces streaming
    pub use_bulk_upload: Option<bool>,
}

impl ManualExport {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn days_back(days: u32) -> Self {
        Self {
            days_back: Some(days),
            ..Default::default()
        }
    }

    pub fn with_bulk_upload(mut self, use_bulk_upload: Option<bool>) -> Self {
        self.use_bulk_upload = use_bulk_upload;
        self
    }

    /// The range this request covers at `now`
    pub fn resolve(&self, now: DateTime<Utc>, default_days_back: u32) -> Result<TimeRange> {
        match (self.start, self.end) {
            (Some(start), end) => TimeRange::new(start, end.unwrap_or(now)),
            (None, Some(_)) => Err(StrataError::InvalidRange(
                "an end time requires a start time".to_string(),
            )),
            (None, None) => {
                TimeRange::days_back(now, self.days_back.unwrap_or(default_days_back))
            }
        }
    }
}

fn checked_before(ts: DateTime<Utc>, span: Duration) -> Result<DateTime<Utc>> {
    ts.checked_sub_signed(span).ok_or_else(|| {
        StrataError::InvalidRange(format!(
            "{}s before {} is out of range",
            span.num_seconds(),
            ts.to_rfc3339()
        ))
    })
}

/// What one window produced
struct WindowAttempt {
    strategy: WriteStrategy,
    read: u64,
    filtered: u64,
    result: Result<WriteOutcome>,
}

/// Export coordinator
pub struct ExportCoordinator {
    reader: SourceReader,
    filter: EntityFilter,
    sink: SinkWriter,
    state: StateManager,
    config: ExportConfig,
    scheduler: SharedScheduler,
    shutdown: watch::Receiver<bool>,
}

impl ExportCoordinator {
    pub fn new(
        reader: SourceReader,
        filter: EntityFilter,
        sink: SinkWriter,
        state: StateManager,
        config: ExportConfig,
        scheduler: SharedScheduler,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let progress_scheduler = Arc::clone(&scheduler);
        let sink = sink.with_progress(Arc::new(move |phase| {
            report_phase(&progress_scheduler, phase);
        }));
        Self {
            reader,
            filter,
            sink,
            state,
            config,
            scheduler,
            shutdown,
        }
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Validate `range` and cut it into windows without touching any backend
    pub fn plan(&self, range: &TimeRange) -> Result<Vec<ExportWindow>> {
        range.ensure_max_span(self.config.max_span_days)?;
        range.split(Duration::days(i64::from(self.config.chunk_days)))
    }

    /// Export an explicit or relative range
    ///
    /// # Errors
    ///
    /// `InvalidRange` before any I/O, `ConcurrentRunRejected` or
    /// `CooldownActive` when the scheduler refuses the run. Failures during
    /// the run are reported in the summary instead.
    pub async fn manual_export(&self, request: &ManualExport) -> Result<ExportRunSummary> {
        let range = request.resolve(Utc::now(), self.config.default_days_back)?;
        self.run(range, RunTrigger::Manual, request.use_bulk_upload)
            .await
    }

    /// Export everything since the watermark
    pub async fn incremental_export(&self) -> Result<ExportRunSummary> {
        let range = self.incremental_range(Utc::now()).await?;
        self.run(range, RunTrigger::Incremental, None).await
    }

    /// `[watermark - overlap, now)`, or the lookback when no watermark exists
    ///
    /// The start is clamped so the range never exceeds `max_span_days`.
    pub async fn incremental_range(&self, now: DateTime<Utc>) -> Result<TimeRange> {
        let last_exported = self
            .state
            .load()
            .await?
            .and_then(|watermark| watermark.last_exported_at);

        let start = match last_exported {
            Some(last) => {
                let overlap = i64::try_from(self.config.incremental_overlap_seconds)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .ok_or_else(|| {
                        StrataError::InvalidRange(format!(
                            "incremental overlap of {}s is out of range",
                            self.config.incremental_overlap_seconds
                        ))
                    })?;
                checked_before(last, overlap)?
            }
            None => {
                tracing::info!(
                    lookback_days = self.config.incremental_lookback_days,
                    "No watermark found, using initial lookback"
                );
                checked_before(
                    now,
                    Duration::days(i64::from(self.config.incremental_lookback_days)),
                )?
            }
        };

        let earliest = checked_before(now, Duration::days(i64::from(self.config.max_span_days)))?;
        let start = if start < earliest {
            tracing::warn!(
                watermark = ?last_exported,
                max_span_days = self.config.max_span_days,
                "Watermark older than the maximum span, clamping incremental range"
            );
            earliest
        } else {
            start
        };

        TimeRange::new(start, now)
    }

    async fn run(
        &self,
        range: TimeRange,
        trigger: RunTrigger,
        force_bulk: Option<bool>,
    ) -> Result<ExportRunSummary> {
        let windows = self.plan(&range)?;
        let guard = RunGuard::begin(&self.scheduler)?;
        let started = Instant::now();

        let mut summary = ExportRunSummary::new(guard.run_id(), trigger, range, windows.len());
        summary.dry_run = self.config.dry_run;

        tracing::info!(
            run_id = %guard.run_id(),
            trigger = trigger.as_str(),
            range = %range,
            windows = windows.len(),
            dry_run = self.config.dry_run,
            "Starting export run"
        );
        lock(&self.scheduler).set_progress(0, windows.len(), 0);

        let mut watermark = None;
        let halted = match self.connect(&guard).await {
            Ok(mut loaded) => {
                let halted = self
                    .export_windows(&windows, force_bulk, &mut summary, &mut loaded)
                    .await;
                watermark = Some(loaded);
                halted
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "Export could not start");
                if let Some(first) = windows.first() {
                    summary.errors.push(WindowFailure::from_error(first, None, &e));
                }
                true
            }
        };

        let status = summary.resolve_status(halted);
        summary.status = status;

        if let Some(mut watermark) = watermark {
            watermark.mark_finished(status.export_status());
            if !self.config.dry_run {
                summary.watermark = watermark.last_exported_at;
                if let Err(e) = self.state.save(&watermark).await {
                    tracing::warn!(error = %e, "Failed to record final export status");
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        report_phase(
            &self.scheduler,
            if status == RunStatus::Failed {
                RunPhase::Failed
            } else {
                RunPhase::Completed
            },
        );
        guard.finish(status);
        summary.log_summary();

        Ok(summary)
    }

    /// Check both ends, create the schema, and mark the watermark as started
    async fn connect(&self, guard: &RunGuard) -> Result<Watermark> {
        report_phase(&self.scheduler, RunPhase::Connecting);

        self.reader.source().test_connection().await?;
        let warehouse = self.sink.warehouse();
        if self.config.dry_run {
            warehouse.test_connection().await?;
        } else {
            warehouse.ensure_schema().await?;
        }

        let mut watermark = self.state.load_or_new().await?;
        if !self.config.dry_run {
            watermark.mark_started(guard.run_id());
            self.state.save(&watermark).await?;
        }
        Ok(watermark)
    }

    /// Run every window; returns true when a failure halted the run
    async fn export_windows(
        &self,
        windows: &[ExportWindow],
        force_bulk: Option<bool>,
        summary: &mut ExportRunSummary,
        watermark: &mut Watermark,
    ) -> bool {
        let extractor = FeatureExtractor::new(summary.started_at);
        let delay = std::time::Duration::from_millis(self.config.inter_window_delay_ms);
        let mut shutdown = self.shutdown.clone();
        let mut prefix_clean = true;

        for window in windows {
            if window.index > 0 && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    Ok(()) = shutdown.changed() => {}
                }
            }
            if *shutdown.borrow() {
                tracing::info!(window = window.index, "Shutdown requested, stopping before window");
                summary.interrupted = true;
                break;
            }

            let attempt = self
                .export_window(window, windows.len(), force_bulk, extractor, &shutdown)
                .await;
            summary.records_read += attempt.read;
            summary.records_filtered += attempt.filtered;

            let mut window_clean = false;
            match attempt.result {
                Ok(outcome) => {
                    summary.records_written += outcome.records_written;
                    if outcome.interrupted {
                        tracing::info!(window = window.index, "Window interrupted by shutdown");
                        summary.interrupted = true;
                        lock(&self.scheduler).set_progress(
                            summary.windows_done,
                            summary.windows_total,
                            summary.records_written,
                        );
                        break;
                    }
                    summary.windows_done += 1;
                    if outcome.failed_batches.is_empty() {
                        window_clean = true;
                    } else {
                        summary
                            .errors
                            .push(WindowFailure::from_batches(window, outcome.failed_batches));
                    }
                    if prefix_clean && window_clean {
                        watermark.advance(window.end, outcome.records_written);
                    } else {
                        watermark.records_exported_count += outcome.records_written;
                    }
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(window = window.index, error = %e, kind = e.kind(), "Export halted");
                    summary
                        .errors
                        .push(WindowFailure::from_error(window, Some(attempt.strategy), &e));
                    return true;
                }
                Err(e) => {
                    tracing::error!(window = window.index, error = %e, kind = e.kind(), "Window failed");
                    summary.windows_done += 1;
                    summary
                        .errors
                        .push(WindowFailure::from_error(window, Some(attempt.strategy), &e));
                }
            }

            prefix_clean &= window_clean;
            if window_clean && prefix_clean && !self.config.dry_run {
                if let Err(e) = self.state.save(watermark).await {
                    tracing::error!(error = %e, "Failed to save watermark");
                    summary
                        .errors
                        .push(WindowFailure::from_error(window, Some(attempt.strategy), &e));
                    return true;
                }
            }

            lock(&self.scheduler).set_progress(
                summary.windows_done,
                summary.windows_total,
                summary.records_written,
            );
        }

        false
    }

    async fn export_window(
        &self,
        window: &ExportWindow,
        windows_total: usize,
        force_bulk: Option<bool>,
        extractor: FeatureExtractor,
        shutdown: &watch::Receiver<bool>,
    ) -> WindowAttempt {
        report_phase(&self.scheduler, RunPhase::Planning);
        let estimate = self.reader.count_estimate(window).await;
        let strategy = WriteStrategy::resolve(force_bulk, estimate, self.config.bulk_threshold);
        log_window_start!(window, windows_total, strategy);

        let read = AtomicU64::new(0);
        let filtered = AtomicU64::new(0);
        let attempt = |result: Result<WriteOutcome>| WindowAttempt {
            strategy,
            read: read.load(Ordering::Relaxed),
            filtered: filtered.load(Ordering::Relaxed),
            result,
        };

        if !self.config.dry_run {
            if let Err(e) = self.sink.warehouse().prepare_range(&window.range()).await {
                return attempt(Err(e));
            }
        }

        report_phase(&self.scheduler, RunPhase::Exporting);
        let (read_count, filtered_count, filter) = (&read, &filtered, &self.filter);
        let records = self
            .reader
            .read(window)
            .try_filter_map(move |raw| {
                read_count.fetch_add(1, Ordering::Relaxed);
                let enriched = match filter.apply(raw) {
                    Some(record) => Some(extractor.enrich(&record)),
                    None => {
                        filtered_count.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                };
                future::ready(Ok(enriched))
            })
            .boxed();

        let result = match strategy {
            WriteStrategy::Streaming => self.sink.write_streaming(records, shutdown).await,
            WriteStrategy::Bulk => {
                self.sink
                    .write_bulk(records, estimate.unwrap_or(0), shutdown)
                    .await
            }
        };

        if let Ok(outcome) = &result {
            tracing::info!(
                window = window.index + 1,
                strategy = %strategy,
                records_read = read.load(Ordering::Relaxed),
                records_written = outcome.records_written,
                failed_batches = outcome.failed_batches.len(),
                "Window exported"
            );
        }
        attempt(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemorySource, MemoryStateStorage, MemoryWarehouse};
    use crate::config::RetryConfig;
    use crate::core::export::run::shared_scheduler;
    use crate::domain::{EntityId, RawRecord};
    use chrono::TimeZone;

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn config() -> ExportConfig {
        ExportConfig {
            chunk_days: 1,
            inter_window_delay_ms: 0,
            cooldown_seconds: 0,
            batch_size: 10,
            retry: RetryConfig {
                max_retries: 1,
                initial_delay_ms: 0,
                max_delay_ms: 0,
                backoff_multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    struct Harness {
        source: Arc<MemorySource>,
        warehouse: Arc<MemoryWarehouse>,
        coordinator: ExportCoordinator,
        _shutdown: watch::Sender<bool>,
    }

    fn harness(config: ExportConfig, hours: i64) -> Harness {
        let source = Arc::new(MemorySource::new((0..hours).map(|h| {
            RawRecord::new(EntityId::new(format!("sensor.s{}", h % 3)).unwrap(), "21.5", t(h))
        })));
        let warehouse = Arc::new(MemoryWarehouse::new());
        let state = StateManager::new_with_storage(Arc::new(MemoryStateStorage::default()), "test");
        let (tx, rx) = watch::channel(false);
        let coordinator = ExportCoordinator::new(
            SourceReader::new(source.clone(), 100),
            EntityFilter::allow_all(),
            SinkWriter::new(warehouse.clone(), &config, None),
            state,
            config.clone(),
            shared_scheduler(std::time::Duration::from_secs(config.cooldown_seconds)),
            rx,
        );
        Harness {
            source,
            warehouse,
            coordinator,
            _shutdown: tx,
        }
    }

    #[test]
    fn test_manual_export_resolution() {
        let now = t(100);
        let range = ManualExport::days_back(2).resolve(now, 30).unwrap();
        assert_eq!(range.start, now - Duration::days(2));
        assert_eq!(range.end, now);

        let range = ManualExport::default().resolve(now, 30).unwrap();
        assert_eq!(range.start, now - Duration::days(30));

        let explicit = ManualExport::between(t(0), t(5)).resolve(now, 30).unwrap();
        assert_eq!((explicit.start, explicit.end), (t(0), t(5)));

        let open_ended = ManualExport {
            start: Some(t(1)),
            ..Default::default()
        };
        assert_eq!(open_ended.resolve(now, 30).unwrap().end, now);

        let end_only = ManualExport {
            end: Some(t(1)),
            ..Default::default()
        };
        assert!(matches!(end_only.resolve(now, 30), Err(StrataError::InvalidRange(_))));
        assert!(ManualExport::days_back(0).resolve(now, 30).is_err());
    }

    #[test]
    fn test_huge_days_back_is_an_invalid_range() {
        let err = ManualExport::days_back(u32::MAX).resolve(t(100), 30).unwrap_err();
        assert!(matches!(err, StrataError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_invalid_range_rejected_before_io() {
        let h = harness(config(), 10);
        let err = h
            .coordinator
            .manual_export(&ManualExport::between(t(5), t(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidRange(_)));
        assert_eq!(h.source.pages_fetched(), 0);
        assert_eq!(lock(h.coordinator.scheduler()).status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn test_span_over_maximum_rejected() {
        let mut cfg = config();
        cfg.max_span_days = 2;
        let h = harness(cfg, 10);
        let err = h
            .coordinator
            .manual_export(&ManualExport::between(t(0), t(24 * 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_export_completes_and_advances_watermark() {
        let h = harness(config(), 60);
        let summary = h
            .coordinator
            .manual_export(&ManualExport::between(t(0), t(72)))
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.windows_total, 3);
        assert_eq!(summary.windows_done, 3);
        assert_eq!(summary.records_read, 60);
        assert_eq!(summary.records_written, 60);
        assert_eq!(summary.watermark, Some(t(72)));
        assert_eq!(h.warehouse.row_count(), 60);
        assert_eq!(lock(h.coordinator.scheduler()).status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_forced_bulk_uses_staging() {
        let h = harness(config(), 30);
        let summary = h
            .coordinator
            .manual_export(&ManualExport::between(t(0), t(48)).with_bulk_upload(Some(true)))
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(h.warehouse.staging_areas_created(), 2);
        assert_eq!(h.warehouse.upsert_calls(), 0);
        assert_eq!(h.warehouse.row_count(), 30);
    }

    #[tokio::test]
    async fn test_merge_failure_is_partial_and_holds_watermark() {
        let h = harness(config(), 30);
        h.warehouse.fail_merge(true);
        let summary = h
            .coordinator
            .manual_export(&ManualExport::between(t(0), t(48)).with_bulk_upload(Some(true)))
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::PartiallyFailed);
        assert_eq!(summary.windows_done, 2);
        assert_eq!(summary.errors.len(), 2);
        assert_eq!(summary.errors[0].error_kind, "merge_failure");
        assert_eq!(summary.watermark, None);
        assert_eq!(h.warehouse.open_staging_areas(), 0);
    }

    #[tokio::test]
    async fn test_source_outage_halts_run() {
        let h = harness(config(), 60);
        h.source.fail_after_pages(1);
        let summary = h
            .coordinator
            .manual_export(&ManualExport::between(t(0), t(72)))
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.windows_done, 1);
        assert_eq!(summary.fatal_error().unwrap().error_kind, "source_unavailable");
        assert_eq!(summary.watermark, Some(t(24)));
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_before_windows() {
        let h = harness(config(), 10);
        h.warehouse.reject_credentials(true);
        let summary = h
            .coordinator
            .manual_export(&ManualExport::between(t(0), t(24)))
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.errors[0].error_kind, "auth_error");
        assert!(summary.errors[0].strategy.is_none());
        assert_eq!(summary.windows_done, 0);
    }

    #[tokio::test]
    async fn test_incremental_uses_watermark_with_overlap() {
        let h = harness(config(), 10);
        let now = Utc::now();

        let first = h.coordinator.incremental_range(now).await.unwrap();
        assert_eq!(first.start, now - Duration::days(7));

        let mut watermark = h.coordinator.state().load_or_new().await.unwrap();
        watermark.advance(now - Duration::hours(2), 0);
        h.coordinator.state().save(&watermark).await.unwrap();

        let next = h.coordinator.incremental_range(now).await.unwrap();
        assert_eq!(next.start, now - Duration::hours(2) - Duration::seconds(60));
        assert_eq!(next.end, now);
    }

    #[tokio::test]
    async fn test_incremental_range_with_unbounded_settings_does_not_panic() {
        let mut cfg = config();
        cfg.max_span_days = u32::MAX;
        cfg.incremental_lookback_days = u32::MAX;
        cfg.incremental_overlap_seconds = u64::MAX;
        let h = harness(cfg, 10);
        let now = Utc::now();

        let err = h.coordinator.incremental_range(now).await.unwrap_err();
        assert!(matches!(err, StrataError::InvalidRange(_)));

        let mut watermark = h.coordinator.state().load_or_new().await.unwrap();
        watermark.advance(now - Duration::hours(2), 0);
        h.coordinator.state().save(&watermark).await.unwrap();
        let err = h.coordinator.incremental_range(now).await.unwrap_err();
        assert!(matches!(err, StrataError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_warehouse_and_watermark_untouched() {
        let mut cfg = config();
        cfg.dry_run = true;
        let h = harness(cfg, 20);
        let summary = h
            .coordinator
            .manual_export(&ManualExport::between(t(0), t(24)))
            .await
            .unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.records_written, 20);
        assert_eq!(h.warehouse.row_count(), 0);
        assert!(summary.watermark.is_none());
        assert!(h.coordinator.state().load().await.unwrap().is_none());
    }
}
