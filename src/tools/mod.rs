// src/tools/mod.rs

//! External collaborators of the pipelines.
//!
//! Each collaborator is a trait so pipelines can be exercised with fakes.
//! The real implementations:
//! - [`bundler::CommandBundler`] runs the configured bundle command.
//! - [`minifier::OxcMinifier`] minifies in-process with `oxc`.
//! - [`schema::ShellCommand`] runs the schema generator subprocess.
//! - [`test_runner::CommandTestRunner`] runs the test command per spec file.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::errors::PipelineError;

pub mod bundler;
pub mod command;
pub mod minifier;
pub mod schema;
pub mod test_runner;

pub use bundler::CommandBundler;
pub use minifier::OxcMinifier;
pub use schema::ShellCommand;
pub use test_runner::CommandTestRunner;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns an entry module into one bundled byte stream.
pub trait Bundler: Send + Sync {
    fn bundle<'a>(&'a self, entry: &'a Path) -> BoxFuture<'a, Result<Vec<u8>, PipelineError>>;
}

/// Minified code plus its source map (JSON).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minified {
    pub code: Vec<u8>,
    pub map: Vec<u8>,
}

/// Produces a minified variant of a bundle.
///
/// Synchronous and CPU-bound; pipelines call it off the async workers.
pub trait Minifier: Send + Sync {
    /// `source_name` is recorded as the map's source file.
    fn minify(&self, code: &[u8], source_name: &str) -> Result<Minified, PipelineError>;
}

/// Produces the schema document.
pub trait SchemaGenerator: Send + Sync {
    fn generate(&self) -> BoxFuture<'_, Result<Vec<u8>, PipelineError>>;
}

/// Result of one test-spec file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFileResult {
    pub file: PathBuf,
    pub passed: bool,
    pub log_lines: Vec<String>,
}

/// Runs every test-spec file matching a glob.
pub trait TestRunner: Send + Sync {
    fn run<'a>(&'a self, glob: &'a str) -> BoxFuture<'a, Result<Vec<TestFileResult>, PipelineError>>;
}
