//! Storage abstraction layer
//!
//! Trait seams for the source, the warehouse, and watermark storage, plus
//! the factory that builds the PostgreSQL implementations from config.

pub mod factory;
pub mod traits;

pub use factory::{create_backends, create_source, create_warehouse_and_state, Backends};
pub use traits::{
    PageCursor, RangeSummary, RecordSource, SourcePage, StagingArea, StateStorage, Warehouse,
};
