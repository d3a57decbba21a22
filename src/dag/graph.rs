// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::dag::task::{TaskDefinition, WatchGlob};
use crate::engine::TaskName;
use crate::errors::{BuildwatchError, Result};
use crate::watch::patterns::GlobMatcher;

/// Incrementally assembles a [`TaskGraph`].
///
/// Prerequisites may name tasks that are registered later; the check that
/// every prerequisite exists happens in [`build`](Self::build). Cycles are
/// rejected as soon as the edges that close them are registered.
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<TaskDefinition>,
    /// Edge `prerequisite -> dependent`; also holds placeholder nodes for
    /// prerequisites that are not registered yet.
    edges: DiGraph<TaskName, ()>,
    nodes: HashMap<TaskName, NodeIndex>,
    globs: Vec<WatchGlob>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task.
    ///
    /// Fails with `DuplicateTask` for a repeated id, `InvalidGlob` for a
    /// pattern that does not compile and `CyclicDependency` if the new
    /// edges close a cycle. A failed registration leaves the builder as it
    /// was.
    pub fn register(&mut self, task: TaskDefinition) -> Result<()> {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(BuildwatchError::DuplicateTask(task.id));
        }

        let matchers = task
            .watch
            .iter()
            .map(|p| GlobMatcher::new(p))
            .collect::<Result<Vec<_>>>()?;

        let node = self.node_for(&task.id);
        let mut added = Vec::new();
        for dep in &task.after {
            if *dep == task.id {
                self.remove_edges(added);
                return Err(BuildwatchError::CyclicDependency(format!(
                    "task '{}' lists itself as a prerequisite",
                    task.id
                )));
            }
            let dep_node = self.node_for(dep);
            added.push(self.edges.add_edge(dep_node, node, ()));
        }

        if let Err(cycle) = toposort(&self.edges, None) {
            let at = self.edges[cycle.node_id()].clone();
            self.remove_edges(added);
            return Err(BuildwatchError::CyclicDependency(format!(
                "registering '{}' closes a prerequisite cycle through '{}'",
                task.id, at
            )));
        }

        for matcher in matchers {
            match self
                .globs
                .iter_mut()
                .find(|g| g.pattern() == matcher.pattern())
            {
                Some(glob) => {
                    glob.tasks.insert(task.id.clone());
                }
                None => self.globs.push(WatchGlob {
                    matcher,
                    tasks: BTreeSet::from([task.id.clone()]),
                }),
            }
        }

        debug!(task = %task.id, after = ?task.after, watch = ?task.watch, "registered task");
        self.tasks.push(task);
        Ok(())
    }

    /// Finish construction. Fails with `UnknownTask` if a prerequisite was
    /// never registered.
    pub fn build(self) -> Result<TaskGraph> {
        let known: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
        for task in &self.tasks {
            if let Some(missing) = task.after.iter().find(|d| !known.contains(d.as_str())) {
                return Err(BuildwatchError::UnknownTask(format!(
                    "'{}' (prerequisite of '{}')",
                    missing, task.id
                )));
            }
        }

        let mut dependents: HashMap<TaskName, Vec<TaskName>> = HashMap::new();
        for task in &self.tasks {
            for dep in &task.after {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }

        Ok(TaskGraph {
            tasks: self.tasks,
            dependents,
            globs: self.globs,
        })
    }

    fn node_for(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(id) {
            return idx;
        }
        let idx = self.edges.add_node(id.to_string());
        self.nodes.insert(id.to_string(), idx);
        idx
    }

    fn remove_edges(&mut self, added: Vec<petgraph::graph::EdgeIndex>) {
        // Newest first, so no surviving index is invalidated by the swap-remove.
        for edge in added.into_iter().rev() {
            self.edges.remove_edge(edge);
        }
    }
}

/// The validated, immutable task graph.
#[derive(Debug)]
pub struct TaskGraph {
    /// Registration order.
    tasks: Vec<TaskDefinition>,
    dependents: HashMap<TaskName, Vec<TaskName>>,
    globs: Vec<WatchGlob>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::new()
    }

    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.task(id).is_some()
    }

    /// Task ids in registration order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    /// Direct prerequisites in declaration order.
    pub fn prerequisites_of(&self, id: &str) -> Result<&[TaskName]> {
        self.task(id)
            .map(|t| t.after.as_slice())
            .ok_or_else(|| BuildwatchError::UnknownTask(id.to_string()))
    }

    /// Tasks listing `id` as a direct prerequisite.
    pub fn dependents_of(&self, id: &str) -> &[TaskName] {
        self.dependents
            .get(id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Transitive prerequisites of `id` in dependency order, followed by
    /// `id` itself. Each task appears once.
    pub fn execution_plan(&self, id: &str) -> Result<Vec<TaskName>> {
        let mut plan = Vec::new();
        let mut seen = HashSet::new();
        self.visit(id, &mut seen, &mut plan)?;
        Ok(plan)
    }

    fn visit(&self, id: &str, seen: &mut HashSet<TaskName>, plan: &mut Vec<TaskName>) -> Result<()> {
        if !seen.insert(id.to_string()) {
            return Ok(());
        }
        for dep in self.prerequisites_of(id)? {
            self.visit(dep, seen, plan)?;
        }
        plan.push(id.to_string());
        Ok(())
    }

    /// Tasks with a glob matching `rel_path` (relative, forward slashes).
    pub fn tasks_watching(&self, rel_path: &str) -> BTreeSet<TaskName> {
        self.globs
            .iter()
            .filter(|g| g.matcher.is_match(rel_path))
            .flat_map(|g| g.tasks.iter().cloned())
            .collect()
    }

    pub fn watch_globs(&self) -> &[WatchGlob] {
        &self.globs
    }

    /// Tasks subscribed to exactly this pattern. Empty for an unknown one.
    pub fn subscribers_of(&self, pattern: &str) -> BTreeSet<TaskName> {
        self.globs
            .iter()
            .find(|g| g.pattern() == pattern)
            .map(|g| g.tasks.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::task::{RunContext, RunFuture, TaskRunner};
    use std::sync::Arc;

    struct Noop;

    impl TaskRunner for Noop {
        fn run<'a>(&'a self, _ctx: &'a RunContext) -> RunFuture<'a> {
            Box::pin(async { Ok(()) })
        }
    }

    fn task(id: &str) -> TaskDefinition {
        TaskDefinition::new(id, Arc::new(Noop))
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut b = TaskGraphBuilder::new();
        b.register(task("build")).unwrap();
        let err = b.register(task("build")).unwrap_err();
        assert!(matches!(err, BuildwatchError::DuplicateTask(id) if id == "build"));
    }

    #[test]
    fn cycle_is_rejected_at_registration_and_builder_stays_usable() {
        let mut b = TaskGraphBuilder::new();
        b.register(task("a").after("b")).unwrap();
        let err = b.register(task("b").after("a")).unwrap_err();
        assert!(matches!(err, BuildwatchError::CyclicDependency(_)));

        // The rejected task left nothing behind.
        b.register(task("b")).unwrap();
        let graph = b.build().unwrap();
        assert_eq!(graph.execution_plan("a").unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut b = TaskGraphBuilder::new();
        assert!(matches!(
            b.register(task("a").after("a")),
            Err(BuildwatchError::CyclicDependency(_))
        ));
    }

    #[test]
    fn missing_prerequisite_fails_build() {
        let mut b = TaskGraphBuilder::new();
        b.register(task("test").after("build")).unwrap();
        assert!(matches!(b.build(), Err(BuildwatchError::UnknownTask(_))));
    }

    #[test]
    fn execution_plan_lists_each_task_once_prerequisites_first() {
        let mut b = TaskGraphBuilder::new();
        b.register(task("schema")).unwrap();
        b.register(task("build").after("schema")).unwrap();
        b.register(task("test").after("build").after("schema")).unwrap();
        let graph = b.build().unwrap();

        assert_eq!(
            graph.execution_plan("test").unwrap(),
            vec!["schema", "build", "test"]
        );
        assert_eq!(graph.dependents_of("schema"), ["build", "test"]);
        assert!(matches!(
            graph.prerequisites_of("nope"),
            Err(BuildwatchError::UnknownTask(_))
        ));
    }

    #[test]
    fn shared_globs_fan_out_to_every_subscriber() {
        let mut b = TaskGraphBuilder::new();
        b.register(task("build").watching("src/**")).unwrap();
        b.register(task("test").watching("src/**").watching("test/**"))
            .unwrap();
        b.register(task("schema").watching("src/schema/schema.js"))
            .unwrap();
        let graph = b.build().unwrap();

        assert_eq!(graph.watch_globs().len(), 3);
        assert_eq!(
            graph.subscribers_of("src/**"),
            BTreeSet::from(["build".to_string(), "test".to_string()])
        );
        assert_eq!(
            graph.tasks_watching("src/schema/schema.js"),
            BTreeSet::from([
                "build".to_string(),
                "schema".to_string(),
                "test".to_string()
            ])
        );
        assert!(graph.tasks_watching("README.md").is_empty());
        assert!(graph.subscribers_of("lib/**").is_empty());
    }
}
