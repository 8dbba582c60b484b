//! PostgreSQL client implementation
//!
//! Pooled connections shared by the recorder source and the warehouse.
//! Driver and pool errors are classified here, so callers only ever see
//! [`StrataError`] variants.

use crate::config::schema::PostgreSQLConfig;
use crate::config::redact_connection_string;
use crate::domain::{Result, StrataError};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, PoolError, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

/// Map a driver error to the Strata error taxonomy
///
/// Rejected credentials and missing privileges become `Authentication`.
/// Connection loss, serialization failures, deadlocks, and server shutdown
/// become `TransientWrite`. Everything else is a `Database` error.
pub fn classify_pg_error(context: &str, err: &tokio_postgres::Error) -> StrataError {
    if let Some(state) = err.code() {
        let code = state.code();
        if code.starts_with("28") || code == "42501" {
            return StrataError::Authentication(format!("{context}: {err}"));
        }
        if code.starts_with("08") || matches!(code, "40001" | "40P01" | "53300" | "57P01" | "57P03")
        {
            return StrataError::TransientWrite(format!("{context}: {err}"));
        }
        return StrataError::Database(format!("{context}: {err}"));
    }

    if err.is_closed() {
        return StrataError::TransientWrite(format!("{context}: connection closed: {err}"));
    }

    // No SQLSTATE: I/O or protocol level failure
    StrataError::TransientWrite(format!("{context}: {err}"))
}

/// Map a pool checkout error
pub fn classify_pool_error(err: PoolError) -> StrataError {
    match err {
        PoolError::Backend(e) => classify_pg_error("Failed to open connection", &e),
        other => StrataError::TransientWrite(format!("Failed to get connection from pool: {other}")),
    }
}

impl From<tokio_postgres::Error> for StrataError {
    fn from(err: tokio_postgres::Error) -> Self {
        classify_pg_error("PostgreSQL error", &err)
    }
}

impl From<PoolError> for StrataError {
    fn from(err: PoolError) -> Self {
        classify_pool_error(err)
    }
}

/// PostgreSQL client for Strata
///
/// Wraps a `deadpool` pool. Every query runs with the configured statement
/// timeout.
pub struct PostgreSQLClient {
    pool: Pool,
    config: PostgreSQLConfig,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// The pool is lazy; no connection is opened until the first query.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the connection string cannot be parsed or
    /// the TLS connector cannot be built.
    pub fn new(config: PostgreSQLConfig) -> Result<Self> {
        let mut pg_config: tokio_postgres::Config = config
            .connection_string
            .expose_secret()
            .as_ref()
            .parse()
            .map_err(|e| {
                StrataError::Configuration(format!("Invalid PostgreSQL connection string: {e}"))
            })?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = match config.ssl_mode.as_str() {
            "disable" => {
                pg_config.ssl_mode(SslMode::Disable);
                Manager::from_config(pg_config, NoTls, manager_config)
            }
            mode => {
                pg_config.ssl_mode(if mode == "require" {
                    SslMode::Require
                } else {
                    SslMode::Prefer
                });
                let connector = native_tls::TlsConnector::builder().build().map_err(|e| {
                    StrataError::Configuration(format!("Failed to build TLS connector: {e}"))
                })?;
                Manager::from_config(pg_config, MakeTlsConnector::new(connector), manager_config)
            }
        };

        let timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .map_err(|e| {
                StrataError::Configuration(format!("Failed to create connection pool: {e}"))
            })?;

        Ok(Self { pool, config })
    }

    /// Test the connection with a trivial query
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| classify_pg_error("Connection test failed", &e))?;

        tracing::info!(target_db = %self.connection_string_safe(), "PostgreSQL connection test successful");
        Ok(())
    }

    /// Check out a connection with the statement timeout applied
    pub async fn get_connection(&self) -> Result<Object> {
        let client = self.pool.get().await?;
        let timeout_query = format!(
            "SET statement_timeout = {}",
            self.config.statement_timeout_seconds * 1000
        );
        client
            .batch_execute(&timeout_query)
            .await
            .map_err(|e| classify_pg_error("Failed to set statement timeout", &e))?;
        Ok(client)
    }

    /// Execute a query and return rows
    pub async fn query(&self, query: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let client = self.get_connection().await?;
        client
            .query(query, params)
            .await
            .map_err(|e| classify_pg_error("Query failed", &e))
    }

    /// Execute a statement and return the number of affected rows
    pub async fn execute(&self, statement: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        let client = self.get_connection().await?;
        client
            .execute(statement, params)
            .await
            .map_err(|e| classify_pg_error("Statement execution failed", &e))
    }

    /// Run several statements separated by semicolons
    pub async fn batch_execute(&self, statements: &str) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .batch_execute(statements)
            .await
            .map_err(|e| classify_pg_error("Batch execution failed", &e))
    }

    /// Connection string with the password redacted
    pub fn connection_string_safe(&self) -> String {
        redact_connection_string(self.config.connection_string.expose_secret().as_ref())
    }

    /// Get the pool statistics
    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}
