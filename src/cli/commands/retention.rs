//! Retention command implementation
//!
//! Shows how much history the recorder still holds.

use super::{format_ts, open_engine, print_json, report_error, EXIT_OK};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the retention command
#[derive(Args, Debug)]
pub struct RetentionArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetentionArgs {
    /// Execute the retention command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let (_, engine) = match open_engine(config_path, shutdown_signal) {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let info = match engine.check_retention().await {
            Ok(info) => info,
            Err(e) => return Ok(report_error("Retention check failed", &e)),
        };

        if self.json {
            return print_json(&info);
        }

        println!("🗄️  Recorder Retention");
        println!();
        println!("  Oldest Record: {}", format_ts(info.min_ts));
        println!("  Newest Record: {}", format_ts(info.max_ts));
        println!("  Span: {:.1} days", info.days);
        println!("  Records (estimate): {}", info.count_estimate);
        println!();
        Ok(EXIT_OK)
    }
}
