//! External system integrations for Strata.
//!
//! - [`database`] - Trait seams for source, warehouse, and state storage
//! - [`postgresql`] - Recorder source and warehouse on PostgreSQL
//! - [`memory`] - In-memory implementations of the same traits
//!
//! # Design Pattern
//!
//! Adapters isolate external systems behind the traits in
//! [`database::traits`], so the export engine can run against PostgreSQL
//! or entirely in memory:
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::adapters::database::{Backends, Warehouse};
//! use strata::adapters::memory::{MemorySource, MemoryStateStorage, MemoryWarehouse};
//!
//! let backends = Backends {
//!     source: Arc::new(MemorySource::default()),
//!     warehouse: Arc::new(MemoryWarehouse::new()),
//!     state: Arc::new(MemoryStateStorage::default()),
//! };
//! assert_eq!(backends.warehouse.name(), "memory");
//! ```

pub mod database;
pub mod memory;
pub mod postgresql;
