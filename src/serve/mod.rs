// src/serve/mod.rs

//! `serve` mode: start-up ordering plus the static/reload server.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServeSection;
use crate::dag::TaskGraph;
use crate::engine::{SchedulerHandle, TaskOutcome};
use crate::errors::{BuildwatchError, Result};
use crate::pipeline::under_root;
use crate::reload::ReloadChannel;
use crate::types::{KNOWN_TASKS, TEST_TASK};
use crate::watch::WatcherHandle;

pub mod server;

/// How long [`ServerHandle::shutdown`] lets open connections drain.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Starts the server only once the build, schema and test tasks are
/// registered and their watches are armed.
#[derive(Debug)]
pub struct ServeController {
    cfg: ServeSection,
    root: PathBuf,
    graph: Arc<TaskGraph>,
    scheduler: SchedulerHandle,
    reload: ReloadChannel,
    watcher: Option<WatcherHandle>,
}

impl ServeController {
    pub fn new(
        cfg: ServeSection,
        root: impl Into<PathBuf>,
        graph: Arc<TaskGraph>,
        scheduler: SchedulerHandle,
        reload: ReloadChannel,
    ) -> Self {
        Self {
            cfg,
            root: root.into(),
            graph,
            scheduler,
            reload,
            watcher: None,
        }
    }

    /// Hand over the active file watcher.
    pub fn arm(&mut self, watcher: WatcherHandle) {
        self.watcher = Some(watcher);
    }

    pub fn is_armed(&self) -> bool {
        self.watcher.is_some()
    }

    /// Check ordering, run one initial pass of every task, then bind.
    ///
    /// Fails with `StartupOrder` (before anything runs or binds) when a
    /// task is missing or its watches are not armed, and with
    /// `StartupRunFailed` when the initial build or schema run fails. A
    /// failing test suite is only logged.
    pub async fn start(mut self) -> Result<ServerHandle> {
        let Some(watcher) = self.watcher.take() else {
            return Err(BuildwatchError::StartupOrder(
                "file watches are not armed".to_string(),
            ));
        };
        self.check_startup_order(&watcher)?;

        for task in KNOWN_TASKS {
            let outcome = self.scheduler.run_and_wait(task).await?;
            match outcome {
                TaskOutcome::Success => info!(task, "initial run succeeded"),
                _ if task == TEST_TASK => {
                    warn!(task, ?outcome, "initial test run did not pass; serving anyway")
                }
                _ => {
                    return Err(BuildwatchError::StartupRunFailed(format!(
                        "initial '{task}' run: {outcome:?}"
                    )));
                }
            }
        }

        let base_dir = under_root(&self.root, &self.cfg.base_dir);
        let addr = format!("{}:{}", self.cfg.host, self.cfg.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding static server to {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("reading bound server address")?;

        let app = server::router(&base_dir, self.reload.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .context("static server failed")?;
            Ok::<(), BuildwatchError>(())
        });

        info!(url = %format!("http://{local_addr}"), base_dir = ?base_dir, "serving");

        Ok(ServerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            join,
            _watcher: watcher,
        })
    }

    fn check_startup_order(&self, watcher: &WatcherHandle) -> Result<()> {
        for task in KNOWN_TASKS {
            if !self.graph.contains(task) {
                return Err(BuildwatchError::StartupOrder(format!(
                    "task '{task}' is not registered"
                )));
            }
        }

        let armed: HashSet<&str> = watcher.globs().iter().map(String::as_str).collect();
        if let Some(missing) = self
            .graph
            .watch_globs()
            .iter()
            .find(|g| !armed.contains(g.pattern()))
        {
            return Err(BuildwatchError::StartupOrder(format!(
                "watch '{}' is not armed",
                missing.pattern()
            )));
        }
        Ok(())
    }
}

/// A running server. Keeps the file watcher alive.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<()>>,
    _watcher: WatcherHandle,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves when the server stops on its own (it normally does not).
    pub async fn wait(&mut self) -> Result<()> {
        (&mut self.join)
            .await
            .map_err(|e| BuildwatchError::Other(anyhow::anyhow!("server task failed: {e}")))?
    }

    /// Stop accepting connections and wait for open ones to close.
    ///
    /// Event streams never end on their own, so after [`DRAIN_TIMEOUT`] the
    /// server task is aborted.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, self.wait()).await;
        match drained {
            Ok(res) => res,
            Err(_) => {
                warn!(
                    timeout_ms = DRAIN_TIMEOUT.as_millis() as u64,
                    "connections still open; stopping server"
                );
                self.join.abort();
                Ok(())
            }
        }
    }
}
