// src/pipeline/mod.rs

//! Task run functions.
//!
//! Each pipeline is a thin adapter from a [`TaskRunner`](crate::dag::TaskRunner)
//! to its collaborators in [`crate::tools`]. [`assemble`] turns a
//! validated config into the task graph the scheduler runs.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::ConfigFile;
use crate::dag::{TaskDefinition, TaskGraph, TaskRunner};
use crate::errors::{BuildwatchError, Result};
use crate::fs::FileSystem;
use crate::reload::ReloadChannel;
use crate::tools::{Bundler, Minifier, SchemaGenerator, TestRunner};
use crate::types::{BUILD_TASK, SCHEMA_TASK, TEST_TASK};

pub mod build;
pub mod schema;
pub mod suite;
pub mod writer;

pub use build::{BuildOutputs, BuildPipeline};
pub use schema::SchemaPipeline;
pub use suite::TestPipeline;
pub use writer::ArtifactWriter;

/// The collaborators a task graph is assembled from.
#[derive(Clone)]
pub struct Collaborators {
    pub bundler: Arc<dyn Bundler>,
    pub minifier: Arc<dyn Minifier>,
    pub schema: Arc<dyn SchemaGenerator>,
    pub tests: Arc<dyn TestRunner>,
    pub fs: Arc<dyn FileSystem>,
}

/// Build the task graph for `cfg`, with paths resolved under `root`.
pub fn assemble(
    cfg: &ConfigFile,
    root: &Path,
    tools: Collaborators,
    reload: ReloadChannel,
) -> Result<TaskGraph> {
    let writer = ArtifactWriter::new(Arc::clone(&tools.fs));

    let build: Arc<dyn TaskRunner> = Arc::new(BuildPipeline::new(
        cfg.build.entry.clone(),
        BuildOutputs::from_config(&cfg.build, root),
        tools.bundler,
        tools.minifier,
        writer.clone(),
        reload,
    ));
    let schema: Arc<dyn TaskRunner> = Arc::new(SchemaPipeline::new(
        tools.schema,
        writer,
        under_root(root, &cfg.schema.output),
    ));
    let test: Arc<dyn TaskRunner> = Arc::new(TestPipeline::new(tools.tests, cfg.test.specs.clone()));

    let mut builder = TaskGraph::builder();
    for section in cfg.task_sections() {
        let runner = match section.name {
            BUILD_TASK => Arc::clone(&build),
            SCHEMA_TASK => Arc::clone(&schema),
            TEST_TASK => Arc::clone(&test),
            other => return Err(BuildwatchError::UnknownTask(other.to_string())),
        };
        let mut task = TaskDefinition::new(section.name, runner);
        task.watch = section.watch.to_vec();
        task.after = section.after.to_vec();
        builder.register(task)?;
    }
    builder.build()
}

/// `root.join(rel)` without `.` components, so `./x` and `x` name the
/// same artifact.
pub fn under_root(root: &Path, rel: &Path) -> PathBuf {
    root.join(rel)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
