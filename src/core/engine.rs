//! Engine facade
//!
//! [`Engine`] wires the backends into one coordinator and one coverage
//! analyzer and exposes every operation a caller can invoke.

use crate::adapters::database::{create_backends, Backends};
use crate::config::StrataConfig;
use crate::core::coverage::{
    BackfillEstimate, CostModel, CoverageAnalyzer, CoverageReport, Gap, RetentionInfo,
};
use crate::core::export::run::{lock, shared_scheduler, SchedulerSnapshot, SharedScheduler};
use crate::core::export::{ExportCoordinator, ExportRunSummary, ManualExport};
use crate::core::filter::EntityFilter;
use crate::core::sink::SinkWriter;
use crate::core::source::SourceReader;
use crate::core::state::{StateManager, Watermark};
use crate::domain::{Result, TimeRange};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Scheduler state plus the persisted watermark
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub scheduler: SchedulerSnapshot,
    pub watermark: Option<Watermark>,
}

/// Export and reconciliation engine
pub struct Engine {
    backends: Backends,
    coordinator: ExportCoordinator,
    coverage: CoverageAnalyzer,
}

impl Engine {
    /// Connect to the configured PostgreSQL backends
    ///
    /// Pools connect lazily, so this does not fail on an unreachable host.
    pub fn from_config(config: &StrataConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let backends = create_backends(config)?;
        Self::new(backends, config, shutdown)
    }

    /// Build an engine over arbitrary backends
    pub fn new(
        backends: Backends,
        config: &StrataConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let filter = EntityFilter::from_config(&config.filter)?;
        let reader = SourceReader::new(backends.source.clone(), config.source.page_size);
        let staging_dir = config.warehouse.staging_dir.as_ref().map(PathBuf::from);
        let sink = SinkWriter::new(backends.warehouse.clone(), &config.export, staging_dir);

        let watermark_id = Watermark::generate_id(
            backends.source.name(),
            &config.warehouse.schema,
            &config.warehouse.table,
        );
        let state = StateManager::new_with_storage(backends.state.clone(), watermark_id);
        let scheduler: SharedScheduler =
            shared_scheduler(Duration::from_secs(config.export.cooldown_seconds));

        let coverage = CoverageAnalyzer::new(
            reader.clone(),
            backends.warehouse.clone(),
            CostModel::from(&config.cost),
        );
        let coordinator = ExportCoordinator::new(
            reader,
            filter,
            sink,
            state,
            config.export.clone(),
            scheduler,
            shutdown,
        );

        Ok(Self {
            backends,
            coordinator,
            coverage,
        })
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        self.coordinator.scheduler()
    }

    /// Check that both the source and the warehouse accept connections
    pub async fn test_connection(&self) -> Result<()> {
        self.backends.source.test_connection().await?;
        tracing::info!(source = self.backends.source.name(), "Source connection OK");
        self.backends.warehouse.test_connection().await?;
        tracing::info!(warehouse = self.backends.warehouse.name(), "Warehouse connection OK");
        Ok(())
    }

    /// Create the warehouse tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        self.backends.warehouse.ensure_schema().await
    }

    pub async fn manual_export(&self, request: &ManualExport) -> Result<ExportRunSummary> {
        self.coordinator.manual_export(request).await
    }

    pub async fn incremental_export(&self) -> Result<ExportRunSummary> {
        self.coordinator.incremental_export().await
    }

    pub async fn check_retention(&self) -> Result<RetentionInfo> {
        self.coverage.check_retention().await
    }

    pub async fn analyze_coverage(&self) -> Result<CoverageReport> {
        self.coverage.analyze().await
    }

    pub async fn find_gaps(&self, min_gap_size: chrono::Duration) -> Result<Vec<Gap>> {
        self.coverage.find_gaps(min_gap_size).await
    }

    /// Estimate exporting `[start_date, end_date)`
    pub async fn estimate_backfill(
        &self,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<BackfillEstimate> {
        let range = TimeRange::new(start_date, end_date)?;
        self.coverage.estimate_backfill(&range).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let scheduler = lock(self.scheduler()).snapshot(Instant::now());
        let watermark = self.coordinator.state().load().await?;
        Ok(EngineStatus {
            scheduler,
            watermark,
        })
    }
}
