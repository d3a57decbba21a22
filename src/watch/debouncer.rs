// src/watch/debouncer.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::{SchedulerHandle, TriggerEvent};

/// One filesystem change under one watched glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub glob: String,
    /// Relative to the project root.
    pub path: PathBuf,
    pub at: Instant,
}

#[derive(Debug)]
struct PendingBurst {
    paths: BTreeSet<PathBuf>,
    deadline: Instant,
}

/// Pure debouncer: per glob, collects changed paths and fires once the
/// quiet window has passed since the *first* change of the burst.
///
/// Later changes extend the pending set but never move the deadline, so a
/// trigger fires at most `window` after a burst starts even under a
/// continuous stream of changes.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeMap<String, PendingBurst>,
    seq: u64,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
            seq: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn add(&mut self, change: RawChange) {
        let window = self.window;
        let burst = self
            .pending
            .entry(change.glob)
            .or_insert_with(|| PendingBurst {
                paths: BTreeSet::new(),
                deadline: change.at + window,
            });
        burst.paths.insert(change.path);
    }

    /// Earliest deadline among pending bursts.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|b| b.deadline).min()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every burst whose deadline is at or before `now`,
    /// in glob order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<TriggerEvent> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, b)| b.deadline <= now)
            .map(|(glob, _)| glob.clone())
            .collect();

        let mut events = Vec::with_capacity(expired.len());
        for glob in expired {
            if let Some(burst) = self.pending.remove(&glob) {
                self.seq += 1;
                events.push(TriggerEvent {
                    glob,
                    paths: burst.paths,
                    seq: self.seq,
                });
            }
        }
        events
    }

    /// Flush everything regardless of deadlines.
    pub fn take_all(&mut self) -> Vec<TriggerEvent> {
        let far = self
            .pending
            .values()
            .map(|b| b.deadline)
            .max()
            .unwrap_or_else(Instant::now);
        self.take_expired(far)
    }
}

/// Drive a [`Debouncer`] from a stream of raw changes and forward the
/// resulting triggers to the scheduler.
///
/// Ends when the change stream closes (pending bursts are flushed first) or
/// the scheduler is gone.
pub fn spawn_debouncer(
    window: Duration,
    mut changes: mpsc::UnboundedReceiver<RawChange>,
    scheduler: SchedulerHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(window);

        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                change = changes.recv() => match change {
                    Some(change) => {
                        debug!(glob = %change.glob, path = ?change.path, "raw change");
                        debouncer.add(change);
                    }
                    None => {
                        for event in debouncer.take_all() {
                            if scheduler.trigger(event).await.is_err() {
                                break;
                            }
                        }
                        debug!("change stream closed; debouncer finished");
                        return;
                    }
                },
                _ = sleep_until_deadline(deadline) => {
                    for event in debouncer.take_expired(Instant::now()) {
                        if let Err(err) = scheduler.trigger(event).await {
                            warn!(error = %err, "scheduler gone; stopping debouncer");
                            return;
                        }
                    }
                }
            }
        }
    })
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
