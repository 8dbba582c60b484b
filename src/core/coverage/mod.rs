//! Coverage and backfill analysis
//!
//! Compares what the recorder still holds with what the warehouse has, and
//! prices the export of a missing range. All figures rest on planner
//! estimates rather than exact counts.

pub mod backfill;
pub mod report;

pub use backfill::{BackfillEstimate, CostModel};
pub use report::{coverage_fraction, detect_gaps, CoverageReport, Gap, GapKind, RetentionInfo};

use crate::adapters::database::traits::Warehouse;
use crate::core::source::SourceReader;
use crate::domain::{Result, TimeRange};
use std::sync::Arc;

/// Answers completeness questions about source and warehouse
#[derive(Clone)]
pub struct CoverageAnalyzer {
    reader: SourceReader,
    warehouse: Arc<dyn Warehouse>,
    cost: CostModel,
}

impl CoverageAnalyzer {
    pub fn new(reader: SourceReader, warehouse: Arc<dyn Warehouse>, cost: CostModel) -> Self {
        Self {
            reader,
            warehouse,
            cost,
        }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Compare all-time source history with the warehouse contents
    pub async fn analyze(&self) -> Result<CoverageReport> {
        let source = self.reader.summary(None).await?;
        let sink = self.warehouse.summary().await?;
        let report = CoverageReport::from_summaries(source, sink);

        tracing::info!(
            coverage_percent = format!("{:.1}", report.coverage_percent()),
            gaps = report.gaps.len(),
            source_records = report.source_range.count_estimate,
            sink_records = report.sink_range.count_estimate,
            "Coverage analyzed"
        );
        Ok(report)
    }

    /// Gaps spanning at least `min_gap_size`
    pub async fn find_gaps(&self, min_gap_size: chrono::Duration) -> Result<Vec<Gap>> {
        let report = self.analyze().await?;
        Ok(report
            .gaps
            .into_iter()
            .filter(|gap| gap.duration() >= min_gap_size)
            .collect())
    }

    /// Price the export of `range`
    pub async fn estimate_backfill(&self, range: &TimeRange) -> Result<BackfillEstimate> {
        let records = self.reader.range_estimate(range).await?;
        let entities = self.reader.entity_estimate(range).await?;
        let estimate = BackfillEstimate::from_counts(*range, records, entities, &self.cost);

        tracing::info!(
            range = %range,
            records = estimate.record_count,
            entities = estimate.entity_count,
            elapsed_secs = estimate.elapsed_estimate_secs,
            "Backfill estimated"
        );
        Ok(estimate)
    }

    /// Span and size of the recorder's retained history
    pub async fn check_retention(&self) -> Result<RetentionInfo> {
        Ok(RetentionInfo::from(self.reader.summary(None).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemorySource, MemoryWarehouse};
    use crate::core::enrich::FeatureExtractor;
    use crate::domain::{EntityId, RawRecord};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(d: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(d)
    }

    fn records(days: std::ops::Range<i64>) -> Vec<RawRecord> {
        days.flat_map(|d| {
            (0..4).map(move |e| {
                RawRecord::new(EntityId::new(format!("sensor.e{e}")).unwrap(), "1", day(d))
            })
        })
        .collect()
    }

    fn analyzer(source_days: std::ops::Range<i64>, sink_days: std::ops::Range<i64>) -> CoverageAnalyzer {
        let source = Arc::new(MemorySource::new(records(source_days)));
        let warehouse = Arc::new(MemoryWarehouse::new());
        let extractor = FeatureExtractor::new(Utc::now());
        warehouse.insert_rows(records(sink_days).iter().map(|r| extractor.enrich(r)));
        CoverageAnalyzer::new(SourceReader::new(source, 100), warehouse, CostModel::default())
    }

    #[tokio::test]
    async fn test_analyze_finds_before_gap() {
        let report = analyzer(0..40, 10..40).analyze().await.unwrap();
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].kind, GapKind::Before);
        assert_eq!(report.gaps[0].days, 10);
        assert!((report.coverage_fraction - 29.0 / 39.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_find_gaps_filters_small_gaps() {
        let analyzer = analyzer(0..40, 10..35);
        assert_eq!(analyzer.find_gaps(Duration::days(1)).await.unwrap().len(), 2);
        let large = analyzer.find_gaps(Duration::days(7)).await.unwrap();
        assert_eq!(large.len(), 1);
        assert_eq!(large[0].kind, GapKind::Before);
    }

    #[tokio::test]
    async fn test_estimate_backfill_counts_range() {
        let analyzer = analyzer(0..40, 0..0);
        let range = TimeRange::new(day(0), day(10)).unwrap();
        let estimate = analyzer.estimate_backfill(&range).await.unwrap();
        assert_eq!(estimate.record_count, 40);
        assert_eq!(estimate.entity_count, 4);
    }

    #[tokio::test]
    async fn test_check_retention() {
        let info = analyzer(0..40, 0..0).check_retention().await.unwrap();
        assert_eq!(info.min_ts, Some(day(0)));
        assert_eq!(info.max_ts, Some(day(39)));
        assert_eq!(info.count_estimate, 160);
    }
}
