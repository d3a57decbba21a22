// src/dag/mod.rs

//! The task graph.
//!
//! - [`task`] defines tasks, their run function and watched globs.
//! - [`graph`] validates registrations (duplicates, cycles, unknown
//!   prerequisites) and answers ordering and glob-subscription queries.

pub mod graph;
pub mod task;

pub use graph::{TaskGraph, TaskGraphBuilder};
pub use task::{RunContext, RunFuture, TaskDefinition, TaskRunner, WatchGlob};
