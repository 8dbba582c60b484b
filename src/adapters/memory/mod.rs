//! In-memory adapters
//!
//! Used by the test suite and handy for exercising the engine without a
//! database. They honour the same contracts as the PostgreSQL adapters:
//! keyset-ordered pages, upserts keyed on `(entity_id, changed_at)`, and
//! staging areas that exist until dropped.

pub mod source;
pub mod warehouse;

pub use source::MemorySource;
pub use warehouse::{MemoryStateStorage, MemoryWarehouse};
