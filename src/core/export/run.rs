//! Run lifecycle and the scheduler state shared across runs
//!
//! Exactly one export may be running at a time. A second request fails fast
//! with `ConcurrentRunRejected`, and a request arriving within the cooldown
//! after the previous run finished fails with `CooldownActive`. The state is
//! a plain [`std::sync::Mutex`] that is never held across an `.await`.

use crate::core::state::ExportStatus;
use crate::domain::{Result, StrataError};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Lifecycle status of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    PartiallyFailed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::PartiallyFailed => "partially_failed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::PartiallyFailed | RunStatus::Failed
        )
    }

    /// Status persisted with the watermark
    pub fn export_status(&self) -> ExportStatus {
        match self {
            RunStatus::Idle => ExportStatus::NotStarted,
            RunStatus::Running => ExportStatus::InProgress,
            RunStatus::Completed => ExportStatus::Completed,
            RunStatus::PartiallyFailed => ExportStatus::PartiallyFailed,
            RunStatus::Failed => ExportStatus::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress phase reported while a run is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Connecting,
    Planning,
    Exporting,
    Uploading,
    Merging,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Connecting => "connecting",
            RunPhase::Planning => "planning",
            RunPhase::Exporting => "exporting",
            RunPhase::Uploading => "uploading",
            RunPhase::Merging => "merging",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Manual,
    Incremental,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Manual => "manual",
            RunTrigger::Incremental => "incremental",
        }
    }
}

/// Point-in-time view of the scheduler, safe to hand to callers
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub status: RunStatus,
    pub phase: Option<RunPhase>,
    pub run_id: Option<Uuid>,
    pub windows_total: usize,
    pub windows_done: usize,
    pub records_written: u64,
    pub cooldown_remaining_secs: u64,
}

/// State shared by every run of one coordinator
#[derive(Debug, Default)]
pub struct SchedulerState {
    status: RunStatus,
    phase: Option<RunPhase>,
    run_id: Option<Uuid>,
    windows_total: usize,
    windows_done: usize,
    records_written: u64,
    last_finished_at: Option<Instant>,
    cooldown: Duration,
}

/// Handle type passed to the coordinator and the engine
pub type SharedScheduler = Arc<Mutex<SchedulerState>>;

/// Create scheduler state with the given cooldown between runs
pub fn shared_scheduler(cooldown: Duration) -> SharedScheduler {
    Arc::new(Mutex::new(SchedulerState {
        cooldown,
        ..Default::default()
    }))
}

/// Lock the scheduler, recovering the state from a poisoned mutex
pub fn lock(scheduler: &SharedScheduler) -> MutexGuard<'_, SchedulerState> {
    scheduler.lock().unwrap_or_else(|p| p.into_inner())
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl SchedulerState {
    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn phase(&self) -> Option<RunPhase> {
        self.phase
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Seconds until a new run is accepted, 0 when none is pending
    pub fn cooldown_remaining(&self, now: Instant) -> u64 {
        match self.last_finished_at {
            Some(finished) if self.status != RunStatus::Running => {
                let ready_at = finished + self.cooldown;
                if ready_at > now {
                    ceil_secs(ready_at - now)
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// Move to `Running`
    ///
    /// # Errors
    ///
    /// `ConcurrentRunRejected` while a run is active, `CooldownActive`
    /// when the previous run ended less than the cooldown ago. Neither
    /// error changes the state.
    pub fn try_begin(&mut self, run_id: Uuid, now: Instant) -> Result<()> {
        if self.status == RunStatus::Running {
            return Err(StrataError::ConcurrentRunRejected);
        }
        let remaining_secs = self.cooldown_remaining(now);
        if remaining_secs > 0 {
            return Err(StrataError::CooldownActive { remaining_secs });
        }

        self.status = RunStatus::Running;
        self.phase = Some(RunPhase::Connecting);
        self.run_id = Some(run_id);
        self.windows_total = 0;
        self.windows_done = 0;
        self.records_written = 0;
        Ok(())
    }

    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = Some(phase);
    }

    pub fn set_progress(&mut self, windows_done: usize, windows_total: usize, records_written: u64) {
        self.windows_done = windows_done;
        self.windows_total = windows_total;
        self.records_written = records_written;
    }

    /// Record a terminal status and start the cooldown
    pub fn finish(&mut self, status: RunStatus, now: Instant) {
        self.status = status;
        self.phase = Some(if status == RunStatus::Failed {
            RunPhase::Failed
        } else {
            RunPhase::Completed
        });
        self.last_finished_at = Some(now);
    }

    pub fn snapshot(&self, now: Instant) -> SchedulerSnapshot {
        SchedulerSnapshot {
            status: self.status,
            phase: self.phase,
            run_id: self.run_id,
            windows_total: self.windows_total,
            windows_done: self.windows_done,
            records_written: self.records_written,
            cooldown_remaining_secs: self.cooldown_remaining(now),
        }
    }
}

/// Log a phase change and expose it on the shared state
pub fn report_phase(scheduler: &SharedScheduler, phase: RunPhase) {
    tracing::info!(status = phase.as_str(), "Export status");
    lock(scheduler).set_phase(phase);
}

/// An accepted run
///
/// Dropping the guard without [`RunGuard::finish`] marks the run `Failed`,
/// so an early return never leaves the scheduler stuck in `Running`.
pub struct RunGuard {
    scheduler: SharedScheduler,
    run_id: Uuid,
    finished: bool,
}

impl RunGuard {
    /// Claim the scheduler for a new run
    pub fn begin(scheduler: &SharedScheduler) -> Result<Self> {
        let run_id = Uuid::new_v4();
        lock(scheduler).try_begin(run_id, Instant::now())?;
        Ok(Self {
            scheduler: Arc::clone(scheduler),
            run_id,
            finished: false,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    pub fn finish(mut self, status: RunStatus) {
        lock(&self.scheduler).finish(status, Instant::now());
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(run_id = %self.run_id, "Run ended without a terminal status");
            lock(&self.scheduler).finish(RunStatus::Failed, Instant::now());
        }
    }
}
