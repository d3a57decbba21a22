use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use buildwatch::dag::RunContext;
use buildwatch::engine::{RuntimeEvent, ScheduledTask, TaskOutcome};
use buildwatch::exec::ExecutorBackend;
use buildwatch::errors::Result;

/// A fake executor that:
/// - records the context of every dispatched run
/// - immediately reports `TaskCompleted` for it, with the outcome set via
///   [`FakeExecutor::fail`] (default `Success`).
///
/// Run functions are never called.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<RunContext>>>,
    outcomes: HashMap<String, TaskOutcome>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<RunContext>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: HashMap::new(),
        }
    }

    /// Report every run of `task` as failed.
    pub fn fail(mut self, task: &str) -> Self {
        self.outcomes.insert(task.to_string(), TaskOutcome::Failed);
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let outcomes = self.outcomes.clone();

        Box::pin(async move {
            for t in tasks {
                executed.lock().unwrap().push(t.ctx.clone());

                let outcome = outcomes
                    .get(&t.name)
                    .copied()
                    .unwrap_or(TaskOutcome::Success);

                // Completions go through the channel like real ones, from a
                // separate task so the runtime is never blocked on its own
                // queue.
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx
                        .send(RuntimeEvent::TaskCompleted {
                            task: t.name,
                            run_id: t.run_id,
                            outcome,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}

/// Task names of `executed`, in dispatch order.
pub fn executed_names(executed: &Arc<Mutex<Vec<RunContext>>>) -> Vec<String> {
    executed
        .lock()
        .unwrap()
        .iter()
        .map(|ctx| ctx.task.clone())
        .collect()
}
