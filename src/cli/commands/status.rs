//! Status command implementation
//!
//! This module implements the `status` command for displaying the stored
//! export watermark.

use super::{format_ts, open_engine, print_json, report_error, EXIT_OK};
use crate::core::state::ExportStatus;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Checking export status");

        let (_, engine) = match open_engine(config_path, shutdown_signal) {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let status = match engine.status().await {
            Ok(s) => s,
            Err(e) => return Ok(report_error("Failed to load watermark", &e)),
        };

        if self.json {
            return print_json(&status);
        }

        println!("📊 Export Status");
        println!();

        let Some(watermark) = status.watermark else {
            println!("No export history found.");
            println!("Run 'strata export' to start exporting data.");
            return Ok(EXIT_OK);
        };

        let label = match watermark.last_export_status {
            ExportStatus::Completed => "✅ Completed",
            ExportStatus::InProgress => "🔄 In Progress",
            ExportStatus::PartiallyFailed => "⚠️  Partially Failed",
            ExportStatus::Failed => "❌ Failed",
            ExportStatus::NotStarted => "⏸️  Not Started",
        };

        println!("  Watermark ID: {}", watermark.id);
        println!("  Status: {label}");
        println!("  Exported Until: {}", format_ts(watermark.last_exported_at));
        println!("  Records Exported: {}", watermark.records_exported_count);
        println!(
            "  Last Run: {}",
            watermark
                .last_run_id
                .map_or_else(|| "-".to_string(), |id| id.to_string())
        );
        println!("  Started: {}", format_ts(watermark.last_export_started_at));
        println!("  Completed: {}", format_ts(watermark.last_export_completed_at));
        println!();
        Ok(EXIT_OK)
    }
}
