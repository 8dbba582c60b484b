//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Strata configuration file.

use super::{EXIT_CONFIG, EXIT_OK};
use crate::config::{load_config, redact_connection_string, FilterMode};
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    ///
    /// Loading already validates, so this never opens a connection.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        let source_url = config.source.postgres.connection_string.expose_secret();
        println!("  Source: {}", redact_connection_string(source_url.as_ref()));
        println!("  Source Page Size: {}", config.source.page_size);
        let warehouse_url = config.warehouse.postgres.connection_string.expose_secret();
        println!("  Warehouse: {}", redact_connection_string(warehouse_url.as_ref()));
        println!(
            "  Target Table: {}.{}",
            config.warehouse.schema, config.warehouse.table
        );
        println!(
            "  State Table: {}.{}",
            config.warehouse.schema, config.warehouse.state_table
        );
        println!("  Window Size: {} day(s)", config.export.chunk_days);
        println!("  Max Span: {} day(s)", config.export.max_span_days);
        println!("  Batch Size: {}", config.export.batch_size);
        println!("  Bulk Threshold: {} records", config.export.bulk_threshold);
        println!("  Cooldown: {}s", config.export.cooldown_seconds);
        println!(
            "  Filter: {} {} pattern(s)",
            match config.filter.mode {
                FilterMode::Include => "include",
                FilterMode::Exclude => "exclude",
            },
            config.filter.patterns.len()
        );
        println!();
        Ok(EXIT_OK)
    }
}
