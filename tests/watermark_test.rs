//! Integration tests for watermark progression
//!
//! The watermark only moves over windows that exported cleanly and in
//! order, so a failed window is always picked up again by the next run.

mod common;

use chrono::{Duration, Utc};
use common::{config, hour, hourly_records, t0, Harness};
use strata::adapters::memory::MemorySource;
use strata::core::export::{ManualExport, RunStatus, RunTrigger};
use strata::core::state::ExportStatus;

const FAST_RETRY: &str = r#"
[export.retry]
max_retries = 1
initial_delay_ms = 0
max_delay_ms = 0
"#;

#[tokio::test]
async fn test_incremental_continues_from_manual_export() {
    let base = Utc::now() - Duration::hours(48);
    let harness = Harness::new(&config("", ""), MemorySource::new(hourly_records(base, 0..48)));

    let manual = harness
        .engine
        .manual_export(&ManualExport::between(base, base + Duration::hours(24)))
        .await
        .unwrap();
    assert_eq!(manual.watermark, Some(base + Duration::hours(24)));
    assert_eq!(harness.warehouse.row_count(), 48);

    let incremental = harness.engine.incremental_export().await.unwrap();
    assert_eq!(incremental.trigger, RunTrigger::Incremental);
    assert_eq!(incremental.status, RunStatus::Completed);
    assert_eq!(incremental.records_read, 48);
    assert_eq!(harness.warehouse.row_count(), 96);
    assert_eq!(incremental.watermark, Some(incremental.range.end));

    // Nothing new since the last run
    let again = harness.engine.incremental_export().await.unwrap();
    assert_eq!(again.status, RunStatus::Completed);
    assert_eq!(again.records_read, 0);
    assert!(again.watermark >= incremental.watermark);
}

#[tokio::test]
async fn test_first_incremental_uses_lookback() {
    let base = Utc::now() - Duration::days(10);
    let harness = Harness::new(
        &config("incremental_lookback_days = 2", ""),
        MemorySource::new(hourly_records(base, 0..240)),
    );

    let summary = harness.engine.incremental_export().await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    let span = summary.range.end - summary.range.start;
    assert_eq!(span, Duration::days(2));
    assert!(summary.records_read <= 2 * 48);
    assert!(summary.records_read >= 2 * 47);
}

#[tokio::test]
async fn test_failed_first_window_holds_watermark() {
    let harness = Harness::new(
        &config("", FAST_RETRY),
        MemorySource::new(hourly_records(t0(), 0..72)),
    );
    // First attempt and its single retry both fail
    harness.warehouse.fail_next_upserts(2);

    let summary = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(72)))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::PartiallyFailed);
    assert_eq!(summary.windows_done, 3);
    assert_eq!(summary.windows_failed(), 1);
    assert_eq!(summary.errors[0].window_index, 0);
    assert_eq!(summary.errors[0].error_kind, "transient_write");
    assert_eq!(harness.warehouse.row_count(), 96);
    assert!(summary.watermark.is_none());

    let watermark = harness.engine.status().await.unwrap().watermark.unwrap();
    assert_eq!(watermark.last_exported_at, None);
    assert_eq!(watermark.last_run_id, Some(summary.run_id));
    assert_eq!(watermark.last_export_status, ExportStatus::PartiallyFailed);

    let rerun = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(72)))
        .await
        .unwrap();
    assert_eq!(rerun.status, RunStatus::Completed);
    assert_eq!(rerun.watermark, Some(hour(72)));
    assert_eq!(harness.warehouse.row_count(), 144);
}

#[tokio::test]
async fn test_transient_failure_recovered_by_retry() {
    let harness = Harness::new(
        &config("", FAST_RETRY),
        MemorySource::new(hourly_records(t0(), 0..24)),
    );
    harness.warehouse.fail_next_upserts(1);

    let summary = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(24)))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert!(summary.errors.is_empty());
    assert_eq!(harness.warehouse.upsert_calls(), 2);
    assert_eq!(summary.watermark, Some(hour(24)));
}

#[tokio::test]
async fn test_watermark_survives_restart() {
    let harness = Harness::new(&config("", ""), MemorySource::new(hourly_records(t0(), 0..48)));
    let summary = harness
        .engine
        .manual_export(&ManualExport::between(hour(0), hour(48)))
        .await
        .unwrap();

    let restarted = harness.restart(&config("", ""));
    let status = restarted.engine.status().await.unwrap();
    let watermark = status.watermark.unwrap();
    assert_eq!(watermark.last_exported_at, Some(hour(48)));
    assert_eq!(watermark.records_exported_count, 96);
    assert_eq!(watermark.last_run_id, Some(summary.run_id));
    assert_eq!(watermark.last_export_status, ExportStatus::Completed);
    assert_eq!(status.scheduler.status, RunStatus::Idle);
}
