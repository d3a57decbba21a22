// src/errors.rs

//! Crate-wide error types.
//!
//! [`BuildwatchError`] covers everything that is fatal to the process or to
//! a single operation (config, graph construction, startup ordering).
//! [`PipelineError`] is task-scoped: a run function returns it, the executor
//! logs it, and the scheduler only ever sees "run failed".

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Cycle detected in task graph: {0}")]
    CyclicDependency(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("Startup order violated: {0}")]
    StartupOrder(String),

    #[error("Task required for startup failed: {0}")]
    StartupRunFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single task run.
///
/// None of these are fatal: prior artifacts stay on disk and the task goes
/// back to idle, ready for the next trigger.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("bundler failed: {0}")]
    Bundle(String),

    #[error("minifier failed: {0}")]
    Minify(String),

    #[error("schema generator failed: {0}")]
    SchemaSubprocess(String),

    #[error("test run failed: {0}")]
    TestRun(String),

    #[error("writing {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BuildwatchError>;
