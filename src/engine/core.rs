// src/engine/core.rs

//! Pure core scheduler state machine.
//!
//! [`Scheduler`] consumes triggers, run requests and completions and
//! produces [`CoreCommand`]s describing what the IO shell should do next.
//! It owns every task's state record and nothing else: no channels, no
//! Tokio types, no IO. The async shell (`engine::runtime::Runtime`) feeds
//! it events and executes the commands.
//!
//! Per task the state is one of [`TaskState`]. A trigger for a running task
//! only marks it for one re-run, so at most one run is in flight and at
//! most one is queued per task. A task whose direct prerequisite is busy
//! waits in an ordered deferred list until the prerequisite is idle again.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::{RunContext, TaskGraph, TaskRunner};
use crate::engine::{TaskName, TaskOutcome, TriggerEvent, TriggerReason};
use crate::errors::{BuildwatchError, Result};

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    /// Running, and another run was requested meanwhile.
    RunningWithPendingRetrigger,
}

/// What `run_task` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    /// Dispatched immediately with this run id.
    Started(u64),
    /// The task was running; it will run once more afterwards.
    Coalesced,
    /// A run was already queued for the task; the request merged into it.
    AlreadyQueued,
    /// Waiting for a prerequisite to become idle.
    Deferred,
    /// Dropped (unknown task or shutting down).
    Ignored,
}

/// A run the shell should hand to the executor.
#[derive(Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub run_id: u64,
    pub runner: Arc<dyn TaskRunner>,
    pub ctx: RunContext,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("run_id", &self.run_id)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send this run to the executor.
    Dispatch(ScheduledTask),
    /// A queued run of `task` was dropped without running.
    Skipped { task: TaskName },
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Context accumulated for a run that has not started yet.
#[derive(Debug, Clone)]
struct PendingRun {
    reason: TriggerReason,
    paths: BTreeSet<PathBuf>,
}

impl PendingRun {
    fn merge(&mut self, reason: TriggerReason, paths: BTreeSet<PathBuf>) {
        if reason == TriggerReason::FileWatch {
            self.reason = TriggerReason::FileWatch;
        }
        self.paths.extend(paths);
    }
}

struct TaskRecord {
    state: TaskState,
    current_run: Option<u64>,
    pending: Option<PendingRun>,
    runner: Arc<dyn TaskRunner>,
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("state", &self.state)
            .field("current_run", &self.current_run)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

/// The scheduler core. See the module docs.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    records: HashMap<TaskName, TaskRecord>,
    /// Idle tasks waiting on a prerequisite, in request order, each once.
    deferred: Vec<TaskName>,
    run_counter: u64,
    shutting_down: bool,
}

impl Scheduler {
    pub fn new(graph: Arc<TaskGraph>) -> Self {
        let records = graph
            .task_ids()
            .filter_map(|id| graph.task(id))
            .map(|def| {
                (
                    def.id.clone(),
                    TaskRecord {
                        state: TaskState::Idle,
                        current_run: None,
                        pending: None,
                        runner: Arc::clone(&def.runner),
                    },
                )
            })
            .collect();

        Self {
            graph,
            records,
            deferred: Vec::new(),
            run_counter: 0,
            shutting_down: false,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.records.get(id).map(|r| r.state)
    }

    /// Run id of the in-flight run of `id`, if any.
    pub fn current_run(&self, id: &str) -> Option<u64> {
        self.records.get(id).and_then(|r| r.current_run)
    }

    pub fn is_deferred(&self, id: &str) -> bool {
        self.deferred.iter().any(|d| d == id)
    }

    /// No task running and nothing waiting.
    pub fn is_idle(&self) -> bool {
        self.deferred.is_empty() && self.running_count() == 0
    }

    pub fn running_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state != TaskState::Idle)
            .count()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// A debounced trigger: run the execution plans of every task subscribed
    /// to the trigger's glob, each task at most once.
    pub fn on_trigger(&mut self, event: &TriggerEvent) -> CoreStep {
        let mut commands = Vec::new();
        if self.shutting_down {
            debug!(glob = %event.glob, "ignoring trigger during shutdown");
            return self.step(commands);
        }

        let subscribers = self.graph.subscribers_of(&event.glob);
        if subscribers.is_empty() {
            debug!(glob = %event.glob, "trigger for glob without subscribers");
        }
        info!(
            glob = %event.glob,
            seq = event.seq,
            paths = ?event.paths,
            tasks = ?subscribers,
            "change detected"
        );

        // One combined plan, so a prerequisite shared by several
        // subscribers runs once per trigger.
        let mut plan: Vec<TaskName> = Vec::new();
        for task in &subscribers {
            match self.graph.execution_plan(task) {
                Ok(ids) => {
                    for id in ids {
                        if !plan.contains(&id) {
                            plan.push(id);
                        }
                    }
                }
                Err(err) => warn!(task = %task, error = %err, "cannot plan run"),
            }
        }
        for id in plan {
            self.run_one(&id, TriggerReason::FileWatch, event.paths.clone(), &mut commands);
        }
        self.step(commands)
    }

    /// Run `task` after its transitive prerequisites.
    pub fn request(&mut self, task: &str, reason: TriggerReason) -> Result<CoreStep> {
        if !self.graph.contains(task) {
            return Err(BuildwatchError::UnknownTask(task.to_string()));
        }
        let mut commands = Vec::new();
        if self.shutting_down {
            debug!(task, "request dropped during shutdown");
            commands.push(CoreCommand::Skipped {
                task: task.to_string(),
            });
            return Ok(self.step(commands));
        }
        self.run_plan(task, reason, &BTreeSet::new(), &mut commands);
        Ok(self.step(commands))
    }

    /// Apply the per-task state machine to `id` alone, without expanding
    /// prerequisites.
    pub fn run_task(
        &mut self,
        id: &str,
        reason: TriggerReason,
        paths: BTreeSet<PathBuf>,
    ) -> Result<(RunDecision, CoreStep)> {
        if !self.records.contains_key(id) {
            return Err(BuildwatchError::UnknownTask(id.to_string()));
        }
        let mut commands = Vec::new();
        let decision = self.run_one(id, reason, paths, &mut commands);
        Ok((decision, self.step(commands)))
    }

    /// A dispatched run finished.
    pub fn on_completed(&mut self, task: &str, run_id: u64, outcome: TaskOutcome) -> CoreStep {
        let mut commands = Vec::new();

        let Some(record) = self.records.get_mut(task) else {
            warn!(task, run_id, "completion for unknown task");
            return self.step(commands);
        };
        if record.state == TaskState::Idle || record.current_run != Some(run_id) {
            warn!(
                task,
                run_id,
                current = ?record.current_run,
                "ignoring completion of a run that is not current"
            );
            return self.step(commands);
        }

        let previous = record.state;
        record.state = TaskState::Idle;
        record.current_run = None;
        let rerun = match previous {
            TaskState::RunningWithPendingRetrigger => record.pending.take(),
            _ => None,
        };

        debug!(task, run_id, ?outcome, ?previous, "core: run completed");

        if let Some(pending) = rerun {
            debug!(task, paths = ?pending.paths, "re-running for changes seen during the run");
            self.run_one(task, pending.reason, pending.paths, &mut commands);
        }

        if outcome == TaskOutcome::Failed
            && self.state_of(task) == Some(TaskState::Idle)
            && !self.is_deferred(task)
        {
            self.skip_dependents_of(task, &mut commands);
        }

        self.release_deferred(&mut commands);
        self.step(commands)
    }

    /// Stop accepting work. Queued runs are dropped (reported as skipped);
    /// in-flight runs finish.
    pub fn shutdown(&mut self) -> CoreStep {
        self.shutting_down = true;
        let mut commands = Vec::new();

        for id in std::mem::take(&mut self.deferred) {
            if let Some(record) = self.records.get_mut(&id) {
                record.pending = None;
            }
            commands.push(CoreCommand::Skipped { task: id });
        }

        let mut queued: Vec<&TaskName> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == TaskState::RunningWithPendingRetrigger)
            .map(|(id, _)| id)
            .collect();
        queued.sort();
        let queued: Vec<TaskName> = queued.into_iter().cloned().collect();
        for id in queued {
            if let Some(record) = self.records.get_mut(&id) {
                record.state = TaskState::Running;
                record.pending = None;
            }
            commands.push(CoreCommand::Skipped { task: id });
        }

        info!(
            running = self.running_count(),
            "shutdown requested; waiting for in-flight runs"
        );
        self.step(commands)
    }

    fn step(&self, commands: Vec<CoreCommand>) -> CoreStep {
        CoreStep {
            commands,
            keep_running: !(self.shutting_down && self.running_count() == 0),
        }
    }

    fn run_plan(
        &mut self,
        task: &str,
        reason: TriggerReason,
        paths: &BTreeSet<PathBuf>,
        commands: &mut Vec<CoreCommand>,
    ) {
        let plan = match self.graph.execution_plan(task) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(task, error = %err, "cannot plan run");
                return;
            }
        };
        for id in plan {
            self.run_one(&id, reason, paths.clone(), commands);
        }
    }

    fn run_one(
        &mut self,
        id: &str,
        reason: TriggerReason,
        paths: BTreeSet<PathBuf>,
        commands: &mut Vec<CoreCommand>,
    ) -> RunDecision {
        if self.shutting_down {
            return RunDecision::Ignored;
        }
        let Some(state) = self.state_of(id) else {
            warn!(task = id, "run requested for unknown task");
            return RunDecision::Ignored;
        };

        let decision = match state {
            TaskState::Idle if self.is_deferred(id) => {
                self.merge_pending(id, reason, paths);
                RunDecision::AlreadyQueued
            }
            TaskState::Idle if self.is_blocked(id) => {
                self.merge_pending(id, reason, paths);
                self.deferred.push(id.to_string());
                RunDecision::Deferred
            }
            TaskState::Idle => match self.start(id, reason, paths) {
                Some(task) => {
                    let run_id = task.run_id;
                    commands.push(CoreCommand::Dispatch(task));
                    RunDecision::Started(run_id)
                }
                None => RunDecision::Ignored,
            },
            TaskState::Running => {
                if let Some(record) = self.records.get_mut(id) {
                    record.state = TaskState::RunningWithPendingRetrigger;
                }
                self.merge_pending(id, reason, paths);
                RunDecision::Coalesced
            }
            TaskState::RunningWithPendingRetrigger => {
                self.merge_pending(id, reason, paths);
                RunDecision::AlreadyQueued
            }
        };

        debug!(task = id, ?decision, "core: run_task");
        decision
    }

    /// Whether a direct prerequisite of `id` is busy or itself waiting.
    fn is_blocked(&self, id: &str) -> bool {
        self.graph
            .prerequisites_of(id)
            .map(|prereqs| {
                prereqs.iter().any(|p| {
                    self.state_of(p) != Some(TaskState::Idle) || self.is_deferred(p)
                })
            })
            .unwrap_or(false)
    }

    fn merge_pending(&mut self, id: &str, reason: TriggerReason, paths: BTreeSet<PathBuf>) {
        if let Some(record) = self.records.get_mut(id) {
            match record.pending.as_mut() {
                Some(pending) => pending.merge(reason, paths),
                None => record.pending = Some(PendingRun { reason, paths }),
            }
        }
    }

    fn start(
        &mut self,
        id: &str,
        reason: TriggerReason,
        paths: BTreeSet<PathBuf>,
    ) -> Option<ScheduledTask> {
        let record = self.records.get_mut(id)?;
        self.run_counter += 1;
        let run_id = self.run_counter;

        record.state = TaskState::Running;
        record.current_run = Some(run_id);
        record.pending = None;

        Some(ScheduledTask {
            name: id.to_string(),
            run_id,
            runner: Arc::clone(&record.runner),
            ctx: RunContext {
                task: id.to_string(),
                run_id,
                reason,
                paths,
            },
        })
    }

    fn skip_dependents_of(&mut self, failed: &str, commands: &mut Vec<CoreCommand>) {
        let mut dropped: HashSet<TaskName> = HashSet::from([failed.to_string()]);
        loop {
            let next = self.deferred.iter().position(|d| {
                self.graph
                    .prerequisites_of(d)
                    .map(|prereqs| prereqs.iter().any(|p| dropped.contains(p)))
                    .unwrap_or(false)
            });
            let Some(idx) = next else { break };

            let id = self.deferred.remove(idx);
            if let Some(record) = self.records.get_mut(&id) {
                record.pending = None;
            }
            warn!(task = %id, prerequisite = failed, "skipping run: prerequisite failed");
            commands.push(CoreCommand::Skipped { task: id.clone() });
            dropped.insert(id);
        }
    }

    fn release_deferred(&mut self, commands: &mut Vec<CoreCommand>) {
        loop {
            let ready = self.deferred.iter().position(|d| !self.is_blocked(d));
            let Some(idx) = ready else { break };

            let id = self.deferred.remove(idx);
            let pending = self
                .records
                .get_mut(&id)
                .and_then(|r| r.pending.take())
                .unwrap_or(PendingRun {
                    reason: TriggerReason::Manual,
                    paths: BTreeSet::new(),
                });
            debug!(task = %id, "prerequisites idle; releasing deferred run");
            if let Some(task) = self.start(&id, pending.reason, pending.paths) {
                commands.push(CoreCommand::Dispatch(task));
            }
        }
    }
}
