//! Incremental command implementation
//!
//! Exports everything recorded since the stored watermark, with a small
//! overlap so late-arriving rows are picked up again.

use super::export::finish;
use super::{build_engine, load, with_shutdown_grace};
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the incremental command
#[derive(Args, Debug)]
pub struct IncrementalArgs {
    /// Read, filter and enrich without writing to the warehouse
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl IncrementalArgs {
    /// Execute the incremental command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting incremental export");

        let mut config = match load(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        if self.dry_run {
            config.export.dry_run = true;
        }

        let engine = match build_engine(&config, shutdown_signal.clone()) {
            Ok(e) => e,
            Err(code) => return Ok(code),
        };

        let grace = Duration::from_secs(config.export.shutdown_timeout_secs);
        let outcome =
            with_shutdown_grace(engine.incremental_export(), shutdown_signal, grace).await;
        finish(outcome, self.json)
    }
}
