//! Export orchestration
//!
//! - [`run`]: run lifecycle, single-flight scheduling, and cooldown
//! - [`coordinator`]: windowed export of a time range
//! - [`summary`]: what a finished run reports

pub mod coordinator;
pub mod run;
pub mod summary;

pub use coordinator::{ExportCoordinator, ManualExport};
pub use run::{
    shared_scheduler, RunGuard, RunPhase, RunStatus, RunTrigger, SchedulerSnapshot,
    SchedulerState, SharedScheduler,
};
pub use summary::{ExportRunSummary, WindowFailure};
