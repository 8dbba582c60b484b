//! Integration tests for bulk load cleanup
//!
//! Whatever happens during a bulk window, the staging artifact on disk and
//! the staging area in the warehouse are gone afterwards and the target
//! table only changes on a successful merge.

mod common;

use common::{config, hour, hourly_records, t0, Harness};
use std::path::Path;
use strata::adapters::memory::MemorySource;
use strata::config::StrataConfig;
use strata::core::export::{ManualExport, RunStatus};

fn config_staging_in(dir: &Path) -> StrataConfig {
    let mut cfg = config("", "");
    cfg.warehouse.staging_dir = Some(dir.display().to_string());
    cfg
}

fn leftover_artifacts(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn bulk(start: i64, end: i64) -> ManualExport {
    ManualExport::between(hour(start), hour(end)).with_bulk_upload(Some(true))
}

#[tokio::test]
async fn test_successful_bulk_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        &config_staging_in(dir.path()),
        MemorySource::new(hourly_records(t0(), 0..48)),
    );

    let summary = harness.engine.manual_export(&bulk(0, 48)).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(harness.warehouse.row_count(), 96);
    assert_eq!(harness.warehouse.open_staging_areas(), 0);
    assert_eq!(leftover_artifacts(dir.path()), 0);
}

#[tokio::test]
async fn test_merge_failure_cleans_up_and_keeps_target() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        &config_staging_in(dir.path()),
        MemorySource::new(hourly_records(t0(), 0..48)),
    );
    harness.warehouse.fail_merge(true);

    let summary = harness.engine.manual_export(&bulk(0, 48)).await.unwrap();

    assert_eq!(summary.status, RunStatus::PartiallyFailed);
    assert_eq!(summary.windows_failed(), 2);
    assert!(summary.errors.iter().all(|e| e.error_kind == "merge_failure"));
    assert_eq!(harness.warehouse.row_count(), 0);
    assert_eq!(harness.warehouse.staging_areas_created(), 2);
    assert_eq!(harness.warehouse.open_staging_areas(), 0);
    assert_eq!(leftover_artifacts(dir.path()), 0);
    assert!(summary.watermark.is_none());
}

#[tokio::test]
async fn test_load_failure_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        &config_staging_in(dir.path()),
        MemorySource::new(hourly_records(t0(), 0..24)),
    );
    harness.warehouse.fail_load(true);

    let summary = harness.engine.manual_export(&bulk(0, 24)).await.unwrap();

    assert_eq!(summary.status, RunStatus::PartiallyFailed);
    assert_eq!(summary.errors[0].error_kind, "bulk_load_failure");
    assert_eq!(harness.warehouse.row_count(), 0);
    assert_eq!(harness.warehouse.open_staging_areas(), 0);
    assert_eq!(leftover_artifacts(dir.path()), 0);
}

#[tokio::test]
async fn test_retry_after_merge_failure_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_staging_in(dir.path());
    let harness = Harness::new(&cfg, MemorySource::new(hourly_records(t0(), 0..24)));

    harness.warehouse.fail_merge(true);
    let failed = harness.engine.manual_export(&bulk(0, 24)).await.unwrap();
    assert_eq!(failed.status, RunStatus::PartiallyFailed);

    harness.warehouse.fail_merge(false);
    let summary = harness.engine.manual_export(&bulk(0, 24)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(harness.warehouse.row_count(), 48);
    assert_eq!(summary.watermark, Some(hour(24)));
    assert_eq!(leftover_artifacts(dir.path()), 0);
}

#[tokio::test]
async fn test_missing_staging_dir_fails_window() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let harness = Harness::new(
        &config_staging_in(&missing),
        MemorySource::new(hourly_records(t0(), 0..24)),
    );

    let summary = harness.engine.manual_export(&bulk(0, 24)).await.unwrap();

    assert_eq!(summary.status, RunStatus::PartiallyFailed);
    assert_eq!(summary.errors[0].error_kind, "bulk_load_failure");
    assert_eq!(harness.warehouse.staging_areas_created(), 0);
    assert_eq!(harness.warehouse.row_count(), 0);
}
