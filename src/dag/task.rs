// src/dag/task.rs

//! Task definitions and the run-function seam.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::engine::{TaskName, TriggerReason};
use crate::errors::PipelineError;
use crate::watch::patterns::GlobMatcher;

/// Everything a run function learns about the run it is executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub task: TaskName,
    /// Monotonic per process, shared by nothing else.
    pub run_id: u64,
    pub reason: TriggerReason,
    /// Changed paths that led to this run (merged across coalesced triggers).
    /// Empty for manual runs.
    pub paths: BTreeSet<PathBuf>,
}

/// Future returned by a run function.
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;

/// A task's run function.
///
/// Implementations must be idempotent: running twice with unchanged inputs
/// must leave unchanged outputs. Errors are task-scoped; the scheduler only
/// learns that the run failed.
pub trait TaskRunner: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a RunContext) -> RunFuture<'a>;
}

/// Static description of one task, as handed to
/// [`TaskGraphBuilder::register`](super::TaskGraphBuilder::register).
#[derive(Clone)]
pub struct TaskDefinition {
    pub id: TaskName,
    /// Watched globs. Empty means the task only runs when requested.
    pub watch: Vec<String>,
    /// Direct prerequisites, in declaration order.
    pub after: Vec<TaskName>,
    pub runner: Arc<dyn TaskRunner>,
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("watch", &self.watch)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

impl TaskDefinition {
    pub fn new(id: impl Into<TaskName>, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            id: id.into(),
            watch: Vec::new(),
            after: Vec::new(),
            runner,
        }
    }

    pub fn watching(mut self, pattern: impl Into<String>) -> Self {
        self.watch.push(pattern.into());
        self
    }

    pub fn after(mut self, prerequisite: impl Into<TaskName>) -> Self {
        self.after.push(prerequisite.into());
        self
    }
}

/// A watched pattern and the tasks subscribed to it.
#[derive(Debug, Clone)]
pub struct WatchGlob {
    pub matcher: GlobMatcher,
    pub tasks: BTreeSet<TaskName>,
}

impl WatchGlob {
    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }
}
