//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{FilterMode, StrataConfig};
use super::secret::secret_string;
use crate::domain::errors::StrataError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`StrataConfig`]
/// 4. Applies environment variable overrides (`STRATA_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`StrataError::Configuration`] if the file is missing or
/// unreadable, a referenced variable is unset, the TOML is malformed, or
/// validation fails.
///
/// # Examples
///
/// ```no_run
/// use strata::config::load_config;
///
/// let config = load_config("strata.toml").expect("Failed to load config");
/// println!("exporting into {}.{}", config.warehouse.schema, config.warehouse.table);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<StrataConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(StrataError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        StrataError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration text, applying substitutions and overrides
pub fn parse_config(contents: &str) -> Result<StrataConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: StrataConfig = toml::from_str(&contents)
        .map_err(|e| StrataError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        StrataError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are copied untouched so documented placeholders in
/// commented-out settings do not have to be set.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| StrataError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| {
                if !missing_vars.iter().any(|m| m == name) {
                    missing_vars.push(name.to_string());
                }
                String::new()
            })
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(StrataError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            StrataError::Configuration(format!("Environment variable {name} has invalid value '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using the `STRATA_<SECTION>_<KEY>` pattern
///
/// For example `STRATA_EXPORT_CHUNK_DAYS=14` or
/// `STRATA_WAREHOUSE_CONNECTION_STRING=postgresql://...`.
fn apply_env_overrides(config: &mut StrataConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("STRATA_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Source overrides
    if let Ok(val) = std::env::var("STRATA_SOURCE_CONNECTION_STRING") {
        config.source.postgres.connection_string = secret_string(val);
    }
    if let Some(size) = env_parse("STRATA_SOURCE_PAGE_SIZE")? {
        config.source.page_size = size;
    }

    // Warehouse overrides
    if let Ok(val) = std::env::var("STRATA_WAREHOUSE_CONNECTION_STRING") {
        config.warehouse.postgres.connection_string = secret_string(val);
    }
    if let Ok(val) = std::env::var("STRATA_WAREHOUSE_SCHEMA") {
        config.warehouse.schema = val;
    }
    if let Ok(val) = std::env::var("STRATA_WAREHOUSE_TABLE") {
        config.warehouse.table = val;
    }
    if let Ok(val) = std::env::var("STRATA_WAREHOUSE_STAGING_DIR") {
        config.warehouse.staging_dir = Some(val);
    }

    // Export overrides
    if let Some(days) = env_parse("STRATA_EXPORT_CHUNK_DAYS")? {
        config.export.chunk_days = days;
    }
    if let Some(size) = env_parse("STRATA_EXPORT_BATCH_SIZE")? {
        config.export.batch_size = size;
    }
    if let Some(threshold) = env_parse("STRATA_EXPORT_BULK_THRESHOLD")? {
        config.export.bulk_threshold = threshold;
    }
    if let Some(secs) = env_parse("STRATA_EXPORT_COOLDOWN_SECONDS")? {
        config.export.cooldown_seconds = secs;
    }
    if let Some(dry_run) = env_parse("STRATA_EXPORT_DRY_RUN")? {
        config.export.dry_run = dry_run;
    }
    if let Some(retries) = env_parse("STRATA_EXPORT_MAX_RETRIES")? {
        config.export.retry.max_retries = retries;
    }

    // Filter overrides
    if let Ok(val) = std::env::var("STRATA_FILTER_MODE") {
        config.filter.mode = match val.to_lowercase().as_str() {
            "include" => FilterMode::Include,
            "exclude" => FilterMode::Exclude,
            other => {
                return Err(StrataError::Configuration(format!(
                    "STRATA_FILTER_MODE must be 'include' or 'exclude', got '{other}'"
                )))
            }
        };
    }

    // Logging overrides
    if let Some(enabled) = env_parse("STRATA_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = enabled;
    }
    if let Ok(val) = std::env::var("STRATA_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
