//! Backend factory
//!
//! Builds the source, warehouse, and state storage from configuration. The
//! warehouse and the state storage share one connection pool.

use crate::adapters::database::traits::{RecordSource, StateStorage, Warehouse};
use crate::adapters::postgresql::{PostgreSQLClient, PostgresWarehouse, RecorderSource, TableLayout};
use crate::config::schema::StrataConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Every backend an engine needs
#[derive(Clone)]
pub struct Backends {
    pub source: Arc<dyn RecordSource>,
    pub warehouse: Arc<dyn Warehouse>,
    pub state: Arc<dyn StateStorage>,
}

/// Create the recorder source
///
/// # Errors
///
/// Returns `Configuration` if the source connection settings are invalid.
pub fn create_source(config: &StrataConfig) -> Result<Arc<dyn RecordSource>> {
    tracing::info!("Creating recorder source client");
    let client = PostgreSQLClient::new(config.source.postgres.clone())?;
    Ok(Arc::new(RecorderSource::new(client)))
}

/// Create the warehouse and the state storage from the same pool
pub fn create_warehouse_and_state(
    config: &StrataConfig,
) -> Result<(Arc<dyn Warehouse>, Arc<dyn StateStorage>)> {
    tracing::info!("Creating warehouse client and state storage");
    let client = PostgreSQLClient::new(config.warehouse.postgres.clone())?;
    let layout = TableLayout::new(
        &config.warehouse.schema,
        &config.warehouse.table,
        &config.warehouse.state_table,
    );
    let adapter = Arc::new(PostgresWarehouse::new(client, layout));

    Ok((
        adapter.clone() as Arc<dyn Warehouse>,
        adapter as Arc<dyn StateStorage>,
    ))
}

/// Create all backends
pub fn create_backends(config: &StrataConfig) -> Result<Backends> {
    let source = create_source(config)?;
    let (warehouse, state) = create_warehouse_and_state(config)?;
    Ok(Backends {
        source,
        warehouse,
        state,
    })
}
