// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning runs
//! itself. Production code uses [`PipelineExecutor`], which runs each
//! task's run function on the Tokio runtime; tests swap in a fake that
//! records dispatches and reports completions on its own schedule.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::engine::{RuntimeEvent, ScheduledTask, TaskOutcome};
use crate::errors::Result;

/// Trait abstracting how scheduled runs are executed.
pub trait ExecutorBackend: Send {
    /// Start the given runs. Must not wait for them to finish; completion
    /// is reported later as `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executes run functions as independent Tokio tasks.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl PipelineExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { runtime_tx }
    }
}

impl ExecutorBackend for PipelineExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            for task in tasks {
                tokio::spawn(execute(task, tx.clone()));
            }
            Ok(())
        })
    }
}

/// Run one scheduled task to completion and report the outcome.
///
/// The error kind stays here: the scheduler only learns success or
/// failure.
async fn execute(task: ScheduledTask, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    info!(
        task = %task.name,
        run_id = task.run_id,
        reason = ?task.ctx.reason,
        paths = ?task.ctx.paths,
        "starting run"
    );
    let started = std::time::Instant::now();

    let outcome = match task.runner.run(&task.ctx).await {
        Ok(()) => {
            info!(
                task = %task.name,
                run_id = task.run_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run finished"
            );
            TaskOutcome::Success
        }
        Err(err) => {
            error!(
                task = %task.name,
                run_id = task.run_id,
                paths = ?task.ctx.paths,
                error = %err,
                "run failed"
            );
            TaskOutcome::Failed
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.name.clone(),
            run_id: task.run_id,
            outcome,
        })
        .await
        .is_err()
    {
        info!(task = %task.name, run_id = task.run_id, "runtime gone; dropping completion");
    }
}
