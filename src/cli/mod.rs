//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Strata using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Strata - recorder history to analytical warehouse export
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
#[command(author = "Strata Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "strata.toml", env = "STRATA_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "STRATA_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export an explicit or relative time range into the warehouse
    Export(commands::export::ExportArgs),

    /// Export everything recorded since the last watermark
    Incremental(commands::incremental::IncrementalArgs),

    /// Show how much history the recorder retains
    Retention(commands::retention::RetentionArgs),

    /// Compare recorder history with warehouse contents
    Coverage(commands::coverage::CoverageArgs),

    /// List history missing from the warehouse
    Gaps(commands::gaps::GapsArgs),

    /// Estimate time and cost of exporting a range
    Backfill(commands::backfill::BackfillArgs),

    /// Show the export watermark
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Commands that work without a configuration file
    pub fn needs_config(&self) -> bool {
        !matches!(self, Commands::Init(_) | Commands::ValidateConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_cli_parse_export() {
        let cli = Cli::parse_from(["strata", "export"]);
        assert_eq!(cli.config, "strata.toml");
        assert!(matches!(cli.command, Commands::Export(_)));
    }

    #[test]
    fn test_cli_parse_export_range() {
        let cli = Cli::parse_from([
            "strata", "export", "--start", "2025-01-01", "--end", "2025-03-16", "--bulk",
        ]);
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.start, Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(args.end, Some(Utc.with_ymd_and_hms(2025, 3, 16, 0, 0, 0).unwrap()));
        assert!(args.bulk);
    }

    #[test]
    fn test_cli_rejects_conflicting_flags() {
        assert!(Cli::try_parse_from(["strata", "export", "--bulk", "--streaming"]).is_err());
        assert!(
            Cli::try_parse_from(["strata", "export", "--start", "2025-01-01", "--days-back", "3"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["strata", "export", "--end", "2025-01-01"]).is_err());
        assert!(Cli::try_parse_from(["strata", "export", "--start", "yesterday"]).is_err());
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["strata", "--config", "custom.toml", "status"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["strata", "--log-level", "debug", "incremental"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Incremental(_)));
    }

    #[test]
    fn test_cli_parse_gaps_default() {
        let cli = Cli::parse_from(["strata", "gaps"]);
        let Commands::Gaps(args) = cli.command else {
            panic!("expected gaps");
        };
        assert_eq!(args.min_days, 1);
    }

    #[test]
    fn test_cli_backfill_requires_start() {
        assert!(Cli::try_parse_from(["strata", "backfill"]).is_err());
        let cli = Cli::parse_from(["strata", "backfill", "--start", "2025-01-01"]);
        assert!(matches!(cli.command, Commands::Backfill(_)));
    }

    #[test]
    fn test_cli_parse_validate_config_and_init() {
        let validate = Cli::parse_from(["strata", "validate-config"]);
        assert!(!validate.command.needs_config());
        let init = Cli::parse_from(["strata", "init"]);
        assert!(matches!(init.command, Commands::Init(_)));
        assert!(Cli::parse_from(["strata", "coverage"]).command.needs_config());
    }
}
