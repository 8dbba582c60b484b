//! Coverage command implementation
//!
//! Compares the recorder's history with the warehouse contents.

use super::{format_ts, open_engine, print_json, report_error, EXIT_OK};
use crate::core::coverage::Gap;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the coverage command
#[derive(Args, Debug)]
pub struct CoverageArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl CoverageArgs {
    /// Execute the coverage command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let (_, engine) = match open_engine(config_path, shutdown_signal) {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let report = match engine.analyze_coverage().await {
            Ok(report) => report,
            Err(e) => return Ok(report_error("Coverage analysis failed", &e)),
        };

        if self.json {
            return print_json(&report);
        }

        println!("📈 Coverage Report");
        println!();
        println!(
            "  Source: {} .. {} (~{} records)",
            format_ts(report.source_range.min_ts),
            format_ts(report.source_range.max_ts),
            report.source_range.count_estimate
        );
        println!(
            "  Warehouse: {} .. {} (~{} records)",
            format_ts(report.sink_range.min_ts),
            format_ts(report.sink_range.max_ts),
            report.sink_range.count_estimate
        );
        println!("  Coverage: {:.1}%", report.coverage_percent());
        println!();

        if report.is_complete() {
            println!("✅ The warehouse covers the full recorder history.");
        } else {
            print_gaps(&report.gaps);
        }
        Ok(EXIT_OK)
    }
}

/// Print gaps as a table; shared with the `gaps` command
pub(crate) fn print_gaps(gaps: &[Gap]) {
    println!(
        "{:<8} {:<20} {:<20} {:>6} {:>14}",
        "Kind", "Start", "End", "Days", "Records (est)"
    );
    println!("{}", "-".repeat(72));
    for gap in gaps {
        println!(
            "{:<8} {:<20} {:<20} {:>6} {:>14}",
            gap.kind.as_str(),
            format_ts(Some(gap.start)),
            format_ts(Some(gap.end)),
            gap.days,
            gap.estimated_records
        );
    }
    println!();
}
