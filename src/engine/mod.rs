// src/engine/mod.rs

//! Orchestration engine for buildwatch.
//!
//! The scheduler reacts to:
//! - debounced file-watch triggers
//! - explicit run requests (one-shot commands, serve start-up)
//! - task completion events
//! - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`], and [`handle`] is the cloneable front door
//! used by the rest of the process.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tokio::sync::oneshot;

use crate::errors::Result;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task run as reported to callers.
///
/// The core only ever produces `Success` and `Failed` from completions;
/// `Skipped` marks a request dropped because a prerequisite failed or the
/// scheduler shut down first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
    Skipped,
}

impl TaskOutcome {
    pub fn is_success(self) -> bool {
        self == TaskOutcome::Success
    }
}

/// Why a task was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Requested directly (one-shot commands, start-up passes).
    Manual,
    /// Triggered due to a filesystem event.
    FileWatch,
}

/// A debounced burst of changes under one watched glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub glob: String,
    pub paths: BTreeSet<PathBuf>,
    /// Logical timestamp, increasing per emitted trigger.
    pub seq: u64,
}

/// Reply channel for a caller waiting on a run.
pub type RunReply = oneshot::Sender<Result<TaskOutcome>>;

/// Events flowing into the runtime from the debouncer, handles and executor.
#[derive(Debug)]
pub enum RuntimeEvent {
    Triggered(TriggerEvent),
    /// Run `task` (after its prerequisites). `reply` resolves with the
    /// outcome of the run that reflects this request.
    RunRequested {
        task: TaskName,
        reason: TriggerReason,
        reply: Option<RunReply>,
    },
    /// A dispatched run finished.
    TaskCompleted {
        task: TaskName,
        run_id: u64,
        outcome: TaskOutcome,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod handle;
pub mod runtime;

pub use self::core::{CoreCommand, CoreStep, RunDecision, ScheduledTask, Scheduler, TaskState};
pub use handle::{spawn_runtime, spawn_scheduler, SchedulerHandle};
pub use runtime::Runtime;
