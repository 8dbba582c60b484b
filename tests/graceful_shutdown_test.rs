//! Integration tests for graceful shutdown
//!
//! These tests verify that:
//! - A shutdown signal stops a run at a window or batch boundary
//! - The watermark only covers windows that completed
//! - A rerun after interruption finishes the job without duplicates

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{config, hour, hourly_records, minute_records, t0, Harness};
use std::time::Duration;
use strata::adapters::memory::MemorySource;
use strata::core::export::{ManualExport, RunStatus};
use strata::core::state::ExportStatus;

#[tokio::test]
async fn test_shutdown_before_start_exports_nothing() {
    let harness = Harness::new(&config("", ""), MemorySource::new(hourly_records(t0(), 0..48)));
    harness.shutdown.send(true).unwrap();

    let summary = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(48)))
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.windows_done, 0);
    assert_eq!(summary.status, RunStatus::PartiallyFailed);
    assert_eq!(harness.warehouse.row_count(), 0);
    assert!(summary.watermark.is_none());
}

#[tokio::test]
async fn test_shutdown_between_windows_keeps_completed_prefix() {
    let cfg = config("inter_window_delay_ms = 500", "");
    let harness = Harness::new(&cfg, MemorySource::new(hourly_records(t0(), 0..72)));

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move {
        engine
            .manual_export(&ManualExport::between(hour(0), hour(72)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.shutdown.send(true).unwrap();

    let summary = run.await.unwrap().unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.windows_done, 1);
    assert_eq!(summary.watermark, Some(hour(24)));
    assert_eq!(harness.warehouse.row_count(), 48);

    let watermark = harness.engine.status().await.unwrap().watermark.unwrap();
    assert_eq!(watermark.last_exported_at, Some(hour(24)));
    assert_eq!(watermark.last_export_status, ExportStatus::PartiallyFailed);

    // Rerunning the same range finishes the job
    let restarted = harness.restart(&config("", ""));
    let summary = restarted
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(72)))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(restarted.warehouse.row_count(), 144);
    assert_eq!(summary.watermark, Some(hour(72)));
}

#[tokio::test]
async fn test_shutdown_mid_window_stops_at_batch_boundary() {
    let cfg = config("batch_size = 100", "");
    let source = MemorySource::new(minute_records(t0(), 0..1440))
        .with_page_delay(Duration::from_millis(20));
    let harness = Harness::new(&cfg, source);

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move {
        engine
            .manual_export(&ManualExport::between(hour(0), hour(24)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.shutdown.send(true).unwrap();

    let summary = run.await.unwrap().unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.windows_done, 0);
    assert!(summary.watermark.is_none());

    let partial = harness.warehouse.row_count();
    assert!(partial < 1440);
    assert_eq!(partial % 100, 0);

    let restarted = harness.restart(&cfg);
    let summary = restarted
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(24)))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(restarted.warehouse.row_count(), 1440);
}

#[tokio::test]
async fn test_incremental_resumes_after_interruption() {
    let base = Utc::now() - ChronoDuration::hours(72);
    let cfg = config("inter_window_delay_ms = 500", "");
    let harness = Harness::new(&cfg, MemorySource::new(hourly_records(base, 0..72)));

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move {
        engine
            .manual_export(&ManualExport::between(base, base + ChronoDuration::hours(72)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.shutdown.send(true).unwrap();
    let interrupted = run.await.unwrap().unwrap();
    assert_eq!(interrupted.watermark, Some(base + ChronoDuration::hours(24)));

    let restarted = harness.restart(&config("", ""));
    let summary = restarted.engine.incremental_export().await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.range.start, base + ChronoDuration::hours(24) - ChronoDuration::seconds(60));
    assert_eq!(summary.records_read, 96);
    assert_eq!(restarted.warehouse.row_count(), 144);
}
