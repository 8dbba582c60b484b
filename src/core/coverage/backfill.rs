//! Backfill cost and time estimates

use crate::config::CostConfig;
use crate::domain::TimeRange;
use serde::Serialize;
use std::time::Duration;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_TIB: f64 = BYTES_PER_GIB * 1024.0;

/// Throughput and unit prices behind every estimate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostModel {
    pub throughput_records_per_minute: u64,
    pub avg_record_bytes: u64,
    pub storage_cost_per_gib_month: f64,
    pub query_cost_per_tib: f64,
    pub recommended_chunk_days: u32,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from(&CostConfig::default())
    }
}

impl From<&CostConfig> for CostModel {
    fn from(config: &CostConfig) -> Self {
        Self {
            throughput_records_per_minute: config.throughput_records_per_minute.max(1),
            avg_record_bytes: config.avg_record_bytes,
            storage_cost_per_gib_month: config.storage_cost_per_gib_month,
            query_cost_per_tib: config.query_cost_per_tib,
            recommended_chunk_days: config.recommended_chunk_days,
        }
    }
}

/// What exporting a range would take
///
/// Counts come from planner estimates, so every figure here is approximate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillEstimate {
    pub range: TimeRange,
    pub record_count: u64,
    pub entity_count: u64,
    pub elapsed_estimate_secs: u64,
    pub storage_bytes_estimate: u64,
    /// Per month of retention
    pub storage_cost_estimate: f64,
    /// One full scan of the backfilled rows
    pub query_cost_estimate: f64,
    pub recommended_chunk_days: u32,
}

impl BackfillEstimate {
    /// Apply `model` to source estimates for `range`
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use strata::core::coverage::{BackfillEstimate, CostModel};
    /// use strata::domain::TimeRange;
    ///
    /// let now = Utc::now();
    /// let range = TimeRange::new(now - Duration::days(30), now).unwrap();
    /// let estimate = BackfillEstimate::from_counts(range, 120_000, 80, &CostModel::default());
    ///
    /// assert_eq!(estimate.elapsed_estimate_secs, 120);
    /// assert_eq!(estimate.storage_bytes_estimate, 48_000_000);
    /// assert_eq!(estimate.recommended_chunk_days, 7);
    /// ```
    pub fn from_counts(
        range: TimeRange,
        record_count: u64,
        entity_count: u64,
        model: &CostModel,
    ) -> Self {
        let minutes = record_count as f64 / model.throughput_records_per_minute.max(1) as f64;
        let storage_bytes = record_count.saturating_mul(model.avg_record_bytes);
        let bytes = storage_bytes as f64;

        Self {
            range,
            record_count,
            entity_count,
            elapsed_estimate_secs: (minutes * 60.0).ceil() as u64,
            storage_bytes_estimate: storage_bytes,
            storage_cost_estimate: bytes / BYTES_PER_GIB * model.storage_cost_per_gib_month,
            query_cost_estimate: bytes / BYTES_PER_TIB * model.query_cost_per_tib,
            recommended_chunk_days: model.recommended_chunk_days,
        }
    }

    pub fn elapsed_estimate(&self) -> Duration {
        Duration::from_secs(self.elapsed_estimate_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn range(days: i64) -> TimeRange {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        TimeRange::new(start, start + chrono::Duration::days(days)).unwrap()
    }

    #[test]
    fn test_costs_follow_the_model() {
        let model = CostModel {
            throughput_records_per_minute: 1_000,
            avg_record_bytes: 1_024,
            storage_cost_per_gib_month: 2.0,
            query_cost_per_tib: 5.0,
            recommended_chunk_days: 3,
        };
        let estimate = BackfillEstimate::from_counts(range(10), 1_048_576, 10, &model);

        assert_eq!(estimate.storage_bytes_estimate, 1_073_741_824);
        assert!((estimate.storage_cost_estimate - 2.0).abs() < 1e-9);
        assert!((estimate.query_cost_estimate - 5.0 / 1024.0).abs() < 1e-9);
        assert_eq!(estimate.elapsed_estimate(), Duration::from_secs(62_915));
        assert_eq!(estimate.recommended_chunk_days, 3);
    }

    #[test]
    fn test_empty_range_costs_nothing() {
        let estimate = BackfillEstimate::from_counts(range(1), 0, 0, &CostModel::default());
        assert_eq!(estimate.elapsed_estimate_secs, 0);
        assert_eq!(estimate.storage_cost_estimate, 0.0);
    }

    #[test]
    fn test_model_from_config() {
        let model = CostModel::from(&CostConfig {
            throughput_records_per_minute: 0,
            ..Default::default()
        });
        assert_eq!(model.throughput_records_per_minute, 1);
        assert_eq!(CostModel::default().avg_record_bytes, 400);
    }
}
