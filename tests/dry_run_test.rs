//! Integration tests for dry-run mode
//!
//! A dry run reads, filters and enriches exactly like a real run but never
//! writes rows, never stages a bulk load and never persists a watermark.

mod common;

use common::{config, hour, hourly_records, t0, Harness};
use strata::adapters::memory::MemorySource;
use strata::core::export::{ManualExport, RunStatus};

#[tokio::test]
async fn test_dry_run_streaming_writes_nothing() {
    let harness = Harness::new(
        &config("dry_run = true", ""),
        MemorySource::new(hourly_records(t0(), 0..48)),
    );

    let summary = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(48)))
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.records_read, 96);
    assert_eq!(summary.records_written, 96);
    assert_eq!(harness.warehouse.row_count(), 0);
    assert_eq!(harness.warehouse.upsert_calls(), 0);
    assert!(summary.watermark.is_none());
    assert!(harness.engine.status().await.unwrap().watermark.is_none());
}

#[tokio::test]
async fn test_dry_run_bulk_creates_no_staging_area() {
    let harness = Harness::new(
        &config("dry_run = true", ""),
        MemorySource::new(hourly_records(t0(), 0..24)),
    );

    let summary = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(24)).with_bulk_upload(Some(true)))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.records_written, 48);
    assert_eq!(harness.warehouse.staging_areas_created(), 0);
    assert_eq!(harness.warehouse.row_count(), 0);
}

#[tokio::test]
async fn test_dry_run_applies_filter() {
    let harness = Harness::new(
        &config(
            "dry_run = true",
            "[filter]\nmode = \"exclude\"\npatterns = [\"switch.*\"]",
        ),
        MemorySource::new(hourly_records(t0(), 0..24)),
    );

    let summary = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(24)))
        .await
        .unwrap();

    assert_eq!(summary.records_read, 48);
    assert_eq!(summary.records_filtered, 24);
    assert_eq!(summary.records_written, 24);
}

#[tokio::test]
async fn test_real_run_after_dry_run_starts_from_scratch() {
    let harness = Harness::new(
        &config("dry_run = true", ""),
        MemorySource::new(hourly_records(t0(), 0..24)),
    );
    harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(24)))
        .await
        .unwrap();

    let live = harness.restart(&config("", ""));
    let summary = live
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(24)))
        .await
        .unwrap();

    assert!(!summary.dry_run);
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(live.warehouse.row_count(), 48);
    assert_eq!(summary.watermark, Some(hour(24)));
}
