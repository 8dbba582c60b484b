//! Backfill command implementation
//!
//! Estimates the time and cost of exporting a range without exporting it.

use super::{open_engine, parse_timestamp, print_json, report_error, EXIT_OK};
use chrono::{DateTime, Utc};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the backfill command
#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Range start (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_timestamp)]
    pub start: DateTime<Utc>,

    /// Range end (RFC 3339 or YYYY-MM-DD); defaults to now
    #[arg(long, value_parser = parse_timestamp)]
    pub end: Option<DateTime<Utc>>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl BackfillArgs {
    /// Execute the backfill command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let (_, engine) = match open_engine(config_path, shutdown_signal) {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let end = self.end.unwrap_or_else(Utc::now);
        let estimate = match engine.estimate_backfill(self.start, end).await {
            Ok(estimate) => estimate,
            Err(e) => return Ok(report_error("Backfill estimate failed", &e)),
        };

        if self.json {
            return print_json(&estimate);
        }

        let elapsed = estimate.elapsed_estimate_secs;
        println!("💰 Backfill Estimate");
        println!();
        println!("  Range: {}", estimate.range);
        println!("  Records (estimate): {}", estimate.record_count);
        println!("  Entities (estimate): {}", estimate.entity_count);
        println!(
            "  Elapsed: ~{}h {:02}m {:02}s",
            elapsed / 3600,
            (elapsed % 3600) / 60,
            elapsed % 60
        );
        println!(
            "  Storage: {:.2} MiB (${:.4}/month)",
            estimate.storage_bytes_estimate as f64 / (1024.0 * 1024.0),
            estimate.storage_cost_estimate
        );
        println!("  Full scan: ${:.4}", estimate.query_cost_estimate);
        println!(
            "  Recommended window size: {} day(s)",
            estimate.recommended_chunk_days
        );
        println!();
        println!("Figures rest on planner estimates and are approximate.");
        Ok(EXIT_OK)
    }
}
