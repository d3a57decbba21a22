// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod reload;
pub mod serve;
pub mod tools;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{resolve_config, ConfigFile};
use crate::dag::TaskGraph;
use crate::engine::{spawn_scheduler, SchedulerHandle, TaskOutcome};
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{assemble, under_root, Collaborators};
use crate::reload::ReloadChannel;
use crate::serve::ServeController;
use crate::tools::{CommandBundler, CommandTestRunner, OxcMinifier, ShellCommand};
use crate::types::{BUILD_TASK, SCHEMA_TASK, TEST_TASK};
use crate::watch::{spawn_debouncer, spawn_watcher, WatcherHandle};

/// How long in-flight runs may take to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - task graph assembly from the real collaborators
/// - the scheduler runtime
/// - (watch/serve) file watcher + debouncer
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let explicit = args.config.as_deref().map(Path::new);
    let (cfg, config_path) = resolve_config(explicit)?;
    let root = config_root_dir(&config_path);
    debug!(config = ?config_path, root = ?root, "resolved project");

    let reload = ReloadChannel::new();
    let graph = Arc::new(assemble(
        &cfg,
        &root,
        real_collaborators(&cfg, &root),
        reload.clone(),
    )?);

    if args.dry_run {
        print_dry_run(&cfg, &root, &graph)?;
        return Ok(());
    }

    let (scheduler, runtime) = spawn_scheduler(Arc::clone(&graph));

    let result = match args.command {
        Command::Build => run_once(&scheduler, &[BUILD_TASK]).await,
        Command::Schema => run_once(&scheduler, &[SCHEMA_TASK]).await,
        Command::Test => run_once(&scheduler, &[TEST_TASK]).await,
        Command::Run { tasks } => run_once(&scheduler, &tasks).await,
        Command::Watch => watch(&cfg, &root, &graph, &scheduler).await,
        Command::Serve => {
            let controller = ServeController::new(
                cfg.serve.clone(),
                root.clone(),
                Arc::clone(&graph),
                scheduler.clone(),
                reload,
            );
            serve(controller, &cfg, &root, &graph, &scheduler).await
        }
    };

    // The runtime may already be gone if it failed; nothing left to stop then.
    let _ = scheduler.shutdown().await;
    match tokio::time::timeout(SHUTDOWN_GRACE, runtime).await {
        Ok(Ok(res)) => res?,
        Ok(Err(e)) => warn!(error = %e, "scheduler runtime task panicked"),
        Err(_) => warn!(
            grace_ms = SHUTDOWN_GRACE.as_millis() as u64,
            "in-flight runs did not finish in time; abandoning them"
        ),
    }

    result
}

/// Run `tasks` one after another (each with its prerequisites) and fail
/// on the first one that does not succeed.
async fn run_once<S: AsRef<str>>(scheduler: &SchedulerHandle, tasks: &[S]) -> Result<()> {
    let work = async {
        for task in tasks {
            let task = task.as_ref();
            match scheduler.run_and_wait(task).await? {
                TaskOutcome::Success => info!(task, "done"),
                outcome => bail!("task '{task}' finished as {outcome:?}"),
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        res = work => res,
        _ = shutdown_signal() => bail!("interrupted"),
    }
}

/// Arm the watches, build once, then keep rebuilding until Ctrl-C.
async fn watch(
    cfg: &ConfigFile,
    root: &Path,
    graph: &TaskGraph,
    scheduler: &SchedulerHandle,
) -> Result<()> {
    let _watcher = arm_watches(cfg, root, graph, scheduler)?;

    let initial = async {
        match scheduler.run_and_wait(BUILD_TASK).await? {
            TaskOutcome::Success => info!("initial build succeeded; watching for changes"),
            outcome => warn!(?outcome, "initial build did not succeed; watching for changes"),
        }
        std::future::pending::<Result<()>>().await
    };

    tokio::select! {
        res = initial => res,
        _ = shutdown_signal() => {
            info!("shutting down");
            Ok(())
        }
    }
}

async fn serve(
    mut controller: ServeController,
    cfg: &ConfigFile,
    root: &Path,
    graph: &TaskGraph,
    scheduler: &SchedulerHandle,
) -> Result<()> {
    controller.arm(arm_watches(cfg, root, graph, scheduler)?);

    let mut server = tokio::select! {
        res = controller.start() => res?,
        _ = shutdown_signal() => bail!("interrupted during startup"),
    };

    let stopped = tokio::select! {
        res = server.wait() => Some(res),
        _ = shutdown_signal() => None,
    };
    match stopped {
        Some(res) => Ok(res?),
        None => {
            info!("shutting down server");
            Ok(server.shutdown().await?)
        }
    }
}

fn arm_watches(
    cfg: &ConfigFile,
    root: &Path,
    graph: &TaskGraph,
    scheduler: &SchedulerHandle,
) -> Result<WatcherHandle> {
    let (changes_tx, changes_rx) = mpsc::unbounded_channel();
    spawn_debouncer(cfg.quiet_window(), changes_rx, scheduler.clone());
    spawn_watcher(root, graph.watch_globs().to_vec(), changes_tx)
}

fn real_collaborators(cfg: &ConfigFile, root: &Path) -> Collaborators {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    Collaborators {
        bundler: Arc::new(CommandBundler::new(cfg.build.bundle_cmd.clone(), root)),
        minifier: Arc::new(OxcMinifier),
        schema: Arc::new(ShellCommand::new(
            cfg.schema.cmd.clone(),
            under_root(root, &cfg.schema.cwd),
        )),
        tests: Arc::new(CommandTestRunner::new(
            cfg.test.cmd.clone(),
            root,
            Arc::clone(&fs),
        )),
        fs,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Figure out the project root.
///
/// - If the config path has a non-empty parent (e.g. "web/Buildwatch.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Buildwatch.toml" (parent = ""),
///   we fall back to the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Print tasks, watches, prerequisites and execution plans.
fn print_dry_run(cfg: &ConfigFile, root: &Path, graph: &TaskGraph) -> Result<()> {
    println!("buildwatch dry-run");
    println!("  root = {}", root.display());
    println!("  watch.quiet_window_ms = {}", cfg.watch.quiet_window_ms);
    println!();

    println!("tasks:");
    for id in graph.task_ids() {
        let Some(task) = graph.task(id) else { continue };
        println!("  - {id}");
        if !task.watch.is_empty() {
            println!("      watch: {:?}", task.watch);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        println!("      plan: {}", graph.execution_plan(id)?.join(" -> "));
    }
    println!();

    println!("artifacts:");
    for path in [
        cfg.build.bundle_path(),
        cfg.build.minified_path(),
        cfg.build.source_map_path(),
        cfg.schema.output.clone(),
    ] {
        println!("  - {}", under_root(root, &path).display());
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
