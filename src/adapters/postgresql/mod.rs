//! PostgreSQL database integration
//!
//! The recorder history is read through [`RecorderSource`]; analytics rows
//! and the export watermark are written through [`PostgresWarehouse`].

pub mod client;
pub mod models;
pub mod recorder;
pub mod warehouse;

pub use client::PostgreSQLClient;
pub use models::{PostgreSQLWatermark, TableLayout};
pub use recorder::RecorderSource;
pub use warehouse::PostgresWarehouse;
