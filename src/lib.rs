// Strata - Recorder history to analytical warehouse export engine
// Copyright (c) 2025 Strata Contributors
// Licensed under the MIT License

//! # Strata - Recorder History Export
//!
//! Strata moves time-series history out of a home-automation recorder
//! database and into an analytical warehouse, where it can be kept for
//! longer than the recorder's retention window and queried at scale.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Extracting** state history in bounded time windows with keyset pagination
//! - **Filtering** noisy entities and sensitive attributes
//! - **Enriching** records with numeric values, categories, rooms and climate fields
//! - **Loading** idempotently, by batched upserts or staging plus merge
//! - **Tracking** a watermark so incremental runs pick up where the last stopped
//! - **Reconciling** source and warehouse: retention, coverage, gaps, backfill cost
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (export, sink, coverage, state)
//! - [`adapters`] - Source, warehouse and state storage backends
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata::config::load_config;
//! use strata::core::export::ManualExport;
//! use strata::core::Engine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("strata.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let engine = Engine::from_config(&config, shutdown_rx)?;
//!
//!     let summary = engine.manual_export(&ManualExport::days_back(30)).await?;
//!     println!("Exported {} records", summary.records_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Idempotence
//!
//! Every warehouse row is keyed by `(entity_id, timestamp)`. Re-exporting a
//! range overwrites rows instead of duplicating them, so a failed or
//! interrupted window is simply exported again.
//!
//! ## Coverage
//!
//! ```rust,no_run
//! # async fn example(engine: strata::core::Engine) -> strata::domain::Result<()> {
//! let report = engine.analyze_coverage().await?;
//! println!("{:.1}% covered", report.coverage_percent());
//! for gap in engine.find_gaps(chrono::Duration::days(7)).await? {
//!     println!("{} gap: {} days", gap.kind.as_str(), gap.days);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Strata uses [`domain::StrataError`] for all library errors. Each variant
//! tells the coordinator whether to retry, give up on one window, or halt:
//!
//! ```rust
//! use strata::domain::StrataError;
//!
//! assert!(StrataError::TransientWrite("timeout".into()).is_transient());
//! assert!(StrataError::Merge("conflict".into()).is_window_failure());
//! assert!(StrataError::Authentication("denied".into()).is_fatal());
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
