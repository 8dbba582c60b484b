//! Configuration management for Strata.
//!
//! Strata reads a single TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `STRATA_<SECTION>_<KEY>` environment overrides
//! - Default values for every optional setting
//! - Validation before anything connects
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level
//! - [`SourceConfig`] - recorder database connection and page size
//! - [`WarehouseConfig`] - warehouse connection, schema, table, staging directory
//! - [`ExportConfig`] - windowing, batching, bulk threshold, cooldown, retries
//! - [`FilterConfig`] - entity include/exclude patterns and denied attributes
//! - [`CostConfig`] - backfill cost model
//! - [`LoggingConfig`] - local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [source]
//! connection_string = "${STRATA_SOURCE_URL}"
//!
//! [warehouse]
//! connection_string = "${STRATA_WAREHOUSE_URL}"
//! schema = "analytics"
//! table = "sensor_data"
//!
//! [export]
//! chunk_days = 7
//! bulk_threshold = 10000
//!
//! [filter]
//! mode = "exclude"
//! patterns = ["sensor.firewall_interface_*", "*_packets_per_second"]
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, CostConfig, ExportConfig, FilterConfig, FilterMode, LoggingConfig,
    PostgreSQLConfig, RetryConfig, SourceConfig, StrataConfig, WarehouseConfig,
};
pub use secret::{redact_connection_string, secret_string, SecretString, SecretValue};
