// src/exec/mod.rs

//! Run execution layer.
//!
//! [`backend`] provides the `ExecutorBackend` trait the runtime dispatches
//! to, and [`PipelineExecutor`], which runs each task's run function on the
//! Tokio runtime and reports the outcome back as a `RuntimeEvent`.

pub mod backend;

pub use backend::{ExecutorBackend, PipelineExecutor};
