//! Domain models and types for Strata.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`EntityId`])
//! - **Record models** ([`RawRecord`], [`EnrichedRecord`], [`DedupKey`], [`Category`])
//! - **Time windows** ([`TimeRange`], [`ExportWindow`])
//! - **Error types** ([`StrataError`]) and the [`Result`] alias
//!
//! # Windows
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use strata::domain::TimeRange;
//!
//! # fn example() -> strata::domain::Result<()> {
//! let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
//! let range = TimeRange::new(start, start + Duration::days(10))?;
//! let windows = range.split(Duration::days(7))?;
//! assert_eq!(windows.len(), 2);
//! assert_eq!(windows[1].end, range.end);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod errors;
pub mod ids;
pub mod record;
pub mod result;
pub mod window;

pub use errors::StrataError;
pub use ids::EntityId;
pub use record::{Category, ClimateFields, DedupKey, EnrichedRecord, RawRecord};
pub use result::Result;
pub use window::{ExportWindow, TimeRange};
