//! Export command implementation
//!
//! This module implements the `export` command, a manual export of an
//! explicit or relative time range from the recorder into the warehouse.

use super::{
    build_engine, load, print_json, report_error, with_shutdown_grace, EXIT_CONFIG,
    EXIT_CONNECTION, EXIT_FATAL, EXIT_INTERRUPTED, EXIT_OK, EXIT_PARTIAL,
};
use crate::core::export::{ExportRunSummary, ManualExport, RunStatus};
use crate::domain::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Range start (RFC 3339 or YYYY-MM-DD); overrides --days-back
    #[arg(long, value_parser = super::parse_timestamp)]
    pub start: Option<DateTime<Utc>>,

    /// Range end (RFC 3339 or YYYY-MM-DD); defaults to now
    #[arg(long, value_parser = super::parse_timestamp, requires = "start")]
    pub end: Option<DateTime<Utc>>,

    /// Export the last N days
    #[arg(long, conflicts_with = "start")]
    pub days_back: Option<u32>,

    /// Force the bulk (staging + merge) path for every window
    #[arg(long, conflicts_with = "streaming")]
    pub bulk: bool,

    /// Force batched upserts for every window
    #[arg(long)]
    pub streaming: bool,

    /// Read, filter and enrich without writing to the warehouse
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ExportArgs {
    fn request(&self) -> ManualExport {
        let force_bulk = match (self.bulk, self.streaming) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        };
        ManualExport {
            start: self.start,
            end: self.end,
            days_back: self.days_back,
            use_bulk_upload: force_bulk,
        }
    }

    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting export command");

        let mut config = match load(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.export.dry_run = true;
        }

        let request = self.request();
        let range = match request.resolve(Utc::now(), config.export.default_days_back) {
            Ok(range) => range,
            Err(e) => return Ok(report_error("Invalid export range", &e)),
        };

        if config.export.dry_run {
            println!("🔍 DRY RUN MODE - No data will be written to the warehouse");
            println!();
        }

        if !self.yes && !config.export.dry_run {
            println!("Export Configuration:");
            println!("  Range: {range}");
            println!("  Days: {:.1}", range.days());
            println!("  Window size: {} day(s)", config.export.chunk_days);
            println!(
                "  Target: {}.{}",
                config.warehouse.schema, config.warehouse.table
            );
            println!(
                "  Strategy: {}",
                match request.use_bulk_upload {
                    Some(true) => "bulk (forced)",
                    Some(false) => "streaming (forced)",
                    None => "automatic",
                }
            );
            println!();
            print!("Proceed with export? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Export cancelled.");
                return Ok(EXIT_OK);
            }
        }

        let engine = match build_engine(&config, shutdown_signal.clone()) {
            Ok(e) => e,
            Err(code) => return Ok(code),
        };

        println!("🚀 Starting export...");
        println!();

        let grace = Duration::from_secs(config.export.shutdown_timeout_secs);
        let outcome =
            with_shutdown_grace(engine.manual_export(&request), shutdown_signal, grace).await;
        finish(outcome, self.json)
    }
}

/// Report the outcome of a run and pick the exit code
///
/// Shared with the `incremental` command.
pub(crate) fn finish(
    outcome: Option<Result<ExportRunSummary>>,
    json: bool,
) -> anyhow::Result<i32> {
    let summary = match outcome {
        None => {
            eprintln!("⚠️  Shutdown timeout reached before the current window finished.");
            eprintln!("   Rows already merged are kept; rerun to resume from the watermark.");
            return Ok(EXIT_INTERRUPTED);
        }
        Some(Err(e)) => return Ok(report_error("Export failed", &e)),
        Some(Ok(summary)) => summary,
    };

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }
    Ok(summary_exit_code(&summary))
}

/// Exit code for a finished run
pub fn summary_exit_code(summary: &ExportRunSummary) -> i32 {
    if summary.interrupted {
        return EXIT_INTERRUPTED;
    }
    match summary.status {
        RunStatus::Completed => EXIT_OK,
        RunStatus::Failed => match summary.fatal_error().map(|e| e.error_kind) {
            Some("auth_error" | "source_unavailable" | "database") => EXIT_CONNECTION,
            Some("configuration") => EXIT_CONFIG,
            _ => EXIT_FATAL,
        },
        _ => EXIT_PARTIAL,
    }
}

fn print_summary(summary: &ExportRunSummary) {
    println!();
    println!("📊 Export Summary:");
    println!("  Run ID: {}", summary.run_id);
    println!("  Range: {}", summary.range);
    println!("  Status: {}", summary.status);
    println!(
        "  Windows: {}/{} processed, {} failed",
        summary.windows_done,
        summary.windows_total,
        summary.windows_failed()
    );
    println!("  Records Read: {}", summary.records_read);
    println!("  Records Filtered: {}", summary.records_filtered);
    println!("  Records Written: {}", summary.records_written);
    if let Some(watermark) = summary.watermark {
        println!("  Watermark: {}", watermark.to_rfc3339());
    }
    println!("  Duration: {:.2}s", summary.duration_ms as f64 / 1000.0);
    println!();

    if !summary.errors.is_empty() {
        println!("⚠️  Errors encountered:");
        for (i, error) in summary.errors.iter().enumerate() {
            if i < 10 {
                println!(
                    "  - window {} [{} .. {}) {}: {}",
                    error.window_index + 1,
                    error.start.to_rfc3339(),
                    error.end.to_rfc3339(),
                    error.error_kind,
                    error.message
                );
            }
        }
        if summary.errors.len() > 10 {
            println!("  ... and {} more", summary.errors.len() - 10);
        }
        println!();
    }

    if summary.interrupted {
        println!("⚠️  Export interrupted gracefully. Progress saved.");
        println!("   Run the same command to resume from the watermark.");
    } else if summary.dry_run {
        println!("✅ Dry run finished, nothing was written.");
    } else if summary.is_successful() {
        println!("✅ Export completed successfully!");
    } else if summary.status == RunStatus::Failed {
        println!("❌ Export halted.");
    } else {
        println!("⚠️  Export completed with failures");
    }
}
