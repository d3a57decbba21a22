// src/tools/schema.rs

use std::path::PathBuf;

use crate::errors::PipelineError;
use crate::tools::command::run_captured;
use crate::tools::{BoxFuture, SchemaGenerator};

/// Runs the schema generator through the shell in a fixed working
/// directory and captures its stdout.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    cmd: String,
    cwd: PathBuf,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: cwd.into(),
        }
    }
}

impl SchemaGenerator for ShellCommand {
    fn generate(&self) -> BoxFuture<'_, Result<Vec<u8>, PipelineError>> {
        Box::pin(async move {
            let out = run_captured(&self.cmd, &self.cwd)
                .await
                .map_err(|e| PipelineError::SchemaSubprocess(format!("{e:#}")))?;
            if !out.success {
                return Err(PipelineError::SchemaSubprocess(format!(
                    "`{}` failed with {}: {}",
                    self.cmd,
                    out.exit_label(),
                    out.stderr_tail(10)
                )));
            }
            Ok(out.stdout)
        })
    }
}
