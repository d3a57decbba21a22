// src/engine/handle.rs

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::dag::TaskGraph;
use crate::errors::{BuildwatchError, Result};
use crate::exec::{ExecutorBackend, PipelineExecutor};

use super::core::Scheduler;
use super::runtime::Runtime;
use super::{RuntimeEvent, TaskOutcome, TriggerEvent, TriggerReason};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Cloneable front door to a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl SchedulerHandle {
    /// Create a handle and the receiving end for a [`Runtime`].
    pub fn channel() -> (Self, mpsc::Receiver<RuntimeEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Raw sender, for executors reporting completions.
    pub fn sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.tx.clone()
    }

    /// Feed a debounced trigger.
    pub async fn trigger(&self, event: TriggerEvent) -> Result<()> {
        self.send(RuntimeEvent::Triggered(event)).await
    }

    /// Request a run of `task` without waiting for it.
    pub async fn request(&self, task: &str) -> Result<()> {
        self.send(RuntimeEvent::RunRequested {
            task: task.to_string(),
            reason: TriggerReason::Manual,
            reply: None,
        })
        .await
    }

    /// Request a run of `task` and wait for the run that reflects the
    /// request. Prerequisites run first; if one fails the result is
    /// [`TaskOutcome::Skipped`].
    pub async fn run_and_wait(&self, task: &str) -> Result<TaskOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RuntimeEvent::RunRequested {
            task: task.to_string(),
            reason: TriggerReason::Manual,
            reply: Some(reply_tx),
        })
        .await?;

        reply_rx.await.map_err(|_| {
            BuildwatchError::Other(anyhow!(
                "scheduler stopped before the run of '{task}' finished"
            ))
        })?
    }

    /// Ask the runtime to stop once in-flight runs finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(RuntimeEvent::ShutdownRequested).await
    }

    async fn send(&self, event: RuntimeEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| BuildwatchError::Other(anyhow!("scheduler runtime is not running")))
    }
}

/// Start a scheduler over `graph` with the given executor on the current
/// Tokio runtime.
pub fn spawn_runtime<E, F>(graph: Arc<TaskGraph>, make_executor: F) -> (SchedulerHandle, JoinHandle<Result<()>>)
where
    E: ExecutorBackend + 'static,
    F: FnOnce(&SchedulerHandle) -> E,
{
    let (handle, rx) = SchedulerHandle::channel();
    let executor = make_executor(&handle);
    let runtime = Runtime::new(Scheduler::new(graph), rx, executor);
    (handle, tokio::spawn(runtime.run()))
}

/// Start a scheduler that executes task run functions for real.
pub fn spawn_scheduler(graph: Arc<TaskGraph>) -> (SchedulerHandle, JoinHandle<Result<()>>) {
    spawn_runtime(graph, |handle| PipelineExecutor::new(handle.sender()))
}
