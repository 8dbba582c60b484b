//! Core business logic for Strata.
//!
//! # Modules
//!
//! - [`source`] - Lazy, keyset-paginated reads of recorder history
//! - [`filter`] - Entity include/exclude rules and attribute denial
//! - [`enrich`] - Feature extraction: numeric values, categories, rooms
//! - [`strategy`] - Streaming vs. bulk write selection
//! - [`sink`] - Idempotent warehouse writes, retries, staging artifacts
//! - [`export`] - Run scheduling and windowed export coordination
//! - [`coverage`] - Coverage, gap, retention, and backfill analysis
//! - [`state`] - Watermark persistence for incremental exports
//! - [`engine`] - The facade tying all of the above together
//!
//! # Export Workflow
//!
//! 1. **Plan**: validate the range and split it into windows
//! 2. **Connect**: test the source, bootstrap the warehouse schema
//! 3. **Per window**: estimate, choose a strategy, stream, filter, enrich, write
//! 4. **Checkpoint**: advance the watermark over the clean prefix of windows
//! 5. **Report**: return an [`export::ExportRunSummary`]
//!
//! # Example
//!
//! ```rust,no_run
//! use strata::config::load_config;
//! use strata::core::export::ManualExport;
//! use strata::core::Engine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("strata.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let engine = Engine::from_config(&config, shutdown_rx)?;
//! let summary = engine.manual_export(&ManualExport::days_back(7)).await?;
//!
//! println!("Status: {}", summary.status);
//! println!("Written: {}", summary.records_written);
//! # Ok(())
//! # }
//! ```

pub mod coverage;
pub mod engine;
pub mod enrich;
pub mod export;
pub mod filter;
pub mod sink;
pub mod source;
pub mod state;
pub mod strategy;

pub use engine::{Engine, EngineStatus};
