// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::exec::ExecutorBackend;
use crate::errors::{BuildwatchError, Result};

use super::core::{CoreCommand, CoreStep, Scheduler};
use super::{RunReply, RuntimeEvent, TaskName, TaskOutcome};

/// Callers waiting on runs, per task.
///
/// `next` waits on the run that has not been dispatched yet; it moves to
/// `current` when the core dispatches that task. A completion resolves
/// `current`; a skipped run resolves `next`.
#[derive(Debug, Default)]
struct Waiters {
    current: HashMap<TaskName, Vec<RunReply>>,
    next: HashMap<TaskName, Vec<RunReply>>,
}

impl Waiters {
    fn wait_for_next(&mut self, task: &str, reply: RunReply) {
        self.next.entry(task.to_string()).or_default().push(reply);
    }

    fn dispatched(&mut self, task: &str) {
        if let Some(waiting) = self.next.remove(task) {
            self.current
                .entry(task.to_string())
                .or_default()
                .extend(waiting);
        }
    }

    fn completed(&mut self, task: &str, outcome: TaskOutcome) {
        resolve(self.current.remove(task), outcome);
    }

    fn skipped(&mut self, task: &str) {
        resolve(self.next.remove(task), TaskOutcome::Skipped);
    }
}

fn resolve(waiting: Option<Vec<RunReply>>, outcome: TaskOutcome) {
    for reply in waiting.into_iter().flatten() {
        // The caller may have stopped waiting.
        let _ = reply.send(Ok(outcome));
    }
}

/// Drives the core [`Scheduler`] in response to `RuntimeEvent`s and
/// delegates run execution to an `ExecutorBackend`.
///
/// All scheduling semantics live in the core; this shell reads events,
/// tracks who waits for which run and hands dispatched runs to the
/// executor.
pub struct Runtime<E: ExecutorBackend> {
    core: Scheduler,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    waiters: Waiters,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: Scheduler, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            waiters: Waiters::default(),
        }
    }

    /// Main event loop.
    ///
    /// Returns once shutdown was requested and no run is in flight, or when
    /// every sender is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("buildwatch scheduler started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.handle_event(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("no runs in flight after shutdown; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    fn handle_event(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::Triggered(trigger) => self.core.on_trigger(&trigger),
            RuntimeEvent::RunRequested {
                task,
                reason,
                reply,
            } => {
                if !self.core.graph().contains(&task) {
                    if let Some(reply) = reply {
                        let _ = reply.send(Err(BuildwatchError::UnknownTask(task.clone())));
                    }
                    debug!(%task, "run requested for unknown task");
                    return self.idle_step();
                }
                if let Some(reply) = reply {
                    self.waiters.wait_for_next(&task, reply);
                }
                match self.core.request(&task, reason) {
                    Ok(step) => step,
                    Err(_) => self.idle_step(),
                }
            }
            RuntimeEvent::TaskCompleted {
                task,
                run_id,
                outcome,
            } => {
                if self.core.current_run(&task) == Some(run_id) {
                    self.waiters.completed(&task, outcome);
                }
                self.core.on_completed(&task, run_id, outcome)
            }
            RuntimeEvent::ShutdownRequested => self.core.shutdown(),
        }
    }

    fn idle_step(&self) -> CoreStep {
        CoreStep {
            commands: Vec::new(),
            keep_running: !(self.core.is_shutting_down() && self.core.running_count() == 0),
        }
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(task) => {
                self.waiters.dispatched(&task.name);
                debug!(task = %task.name, run_id = task.run_id, "dispatching run");
                self.executor.spawn_ready_tasks(vec![task]).await?;
            }
            CoreCommand::Skipped { task } => {
                self.waiters.skipped(&task);
            }
        }
        Ok(())
    }
}
