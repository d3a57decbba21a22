#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use buildwatch::config::{ConfigFile, RawConfigFile};
use buildwatch::dag::{TaskDefinition, TaskGraph, TaskGraphBuilder};
use buildwatch::errors::Result;

use crate::fakes::RecordingRunner;

/// Builder for a `TaskGraph` whose tasks all use [`RecordingRunner`]s.
pub struct GraphFixture {
    builder: TaskGraphBuilder,
    runners: HashMap<String, Arc<RecordingRunner>>,
}

impl GraphFixture {
    pub fn new() -> Self {
        Self {
            builder: TaskGraph::builder(),
            runners: HashMap::new(),
        }
    }

    /// A task that finishes as soon as it starts.
    pub fn task(self, id: &str, watch: &[&str], after: &[&str]) -> Self {
        self.with_runner(id, watch, after, RecordingRunner::new())
    }

    /// A task whose runs wait for [`RecordingRunner::release`].
    pub fn gated_task(self, id: &str, watch: &[&str], after: &[&str]) -> Self {
        self.with_runner(id, watch, after, RecordingRunner::gated())
    }

    pub fn with_runner(
        mut self,
        id: &str,
        watch: &[&str],
        after: &[&str],
        runner: Arc<RecordingRunner>,
    ) -> Self {
        let mut def = TaskDefinition::new(id, runner.clone());
        def.watch = watch.iter().map(|s| s.to_string()).collect();
        def.after = after.iter().map(|s| s.to_string()).collect();
        self.builder
            .register(def)
            .expect("Failed to register fixture task");
        self.runners.insert(id.to_string(), runner);
        self
    }

    pub fn build(self) -> (Arc<TaskGraph>, Runners) {
        let graph = self.builder.build().expect("Failed to build fixture graph");
        (Arc::new(graph), Runners(self.runners))
    }
}

impl Default for GraphFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Runners of a [`GraphFixture`], by task id.
pub struct Runners(HashMap<String, Arc<RecordingRunner>>);

impl Runners {
    pub fn get(&self, id: &str) -> &Arc<RecordingRunner> {
        self.0
            .get(id)
            .unwrap_or_else(|| panic!("no fixture task named '{id}'"))
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn quiet_window_ms(mut self, ms: u64) -> Self {
        self.config.watch.quiet_window_ms = ms;
        self
    }

    pub fn build_after(mut self, dep: &str) -> Self {
        self.config.build.after.push(dep.to_string());
        self
    }

    pub fn schema_after(mut self, dep: &str) -> Self {
        self.config.schema.after.push(dep.to_string());
        self
    }

    pub fn test_after(mut self, dep: &str) -> Self {
        self.config.test.after.push(dep.to_string());
        self
    }

    pub fn build_watch(mut self, patterns: &[&str]) -> Self {
        self.config.build.watch = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn schema_watch(mut self, patterns: &[&str]) -> Self {
        self.config.schema.watch = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn test_watch(mut self, patterns: &[&str]) -> Self {
        self.config.test.watch = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn serve_port(mut self, port: u16) -> Self {
        self.config.serve.port = port;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
