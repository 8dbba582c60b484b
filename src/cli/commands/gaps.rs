//! Gaps command implementation

use super::coverage::print_gaps;
use super::{open_engine, print_json, report_error, EXIT_OK};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the gaps command
#[derive(Args, Debug)]
pub struct GapsArgs {
    /// Ignore gaps shorter than this many days
    #[arg(long, default_value_t = 1)]
    pub min_days: u32,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl GapsArgs {
    /// Execute the gaps command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let (_, engine) = match open_engine(config_path, shutdown_signal) {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let min_gap = chrono::Duration::days(i64::from(self.min_days));
        let gaps = match engine.find_gaps(min_gap).await {
            Ok(gaps) => gaps,
            Err(e) => return Ok(report_error("Gap detection failed", &e)),
        };

        if self.json {
            return print_json(&gaps);
        }

        if gaps.is_empty() {
            println!("✅ No gaps of {} day(s) or more.", self.min_days);
            return Ok(EXIT_OK);
        }

        println!("Found {} gap(s):", gaps.len());
        println!();
        print_gaps(&gaps);
        println!("Backfill with: strata export --start <START> --end <END>");
        Ok(EXIT_OK)
    }
}
