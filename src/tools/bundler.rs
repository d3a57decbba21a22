// src/tools/bundler.rs

use std::path::{Path, PathBuf};

use crate::errors::PipelineError;
use crate::tools::command::{run_captured, substitute};
use crate::tools::{BoxFuture, Bundler};

/// Bundles by running a shell command whose stdout is the bundle
/// (e.g. `browserify {entry} --standalone vl --debug`).
#[derive(Debug, Clone)]
pub struct CommandBundler {
    cmd_template: String,
    root: PathBuf,
}

impl CommandBundler {
    /// `cmd_template` may contain `{entry}`; the command runs in `root`.
    pub fn new(cmd_template: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            cmd_template: cmd_template.into(),
            root: root.into(),
        }
    }
}

impl Bundler for CommandBundler {
    fn bundle<'a>(&'a self, entry: &'a Path) -> BoxFuture<'a, Result<Vec<u8>, PipelineError>> {
        Box::pin(async move {
            let cmd = substitute(&self.cmd_template, "entry", &entry.to_string_lossy());
            let out = run_captured(&cmd, &self.root)
                .await
                .map_err(|e| PipelineError::Bundle(format!("{e:#}")))?;

            if !out.success {
                return Err(PipelineError::Bundle(format!(
                    "`{cmd}` failed with {}: {}",
                    out.exit_label(),
                    out.stderr_tail(10)
                )));
            }
            if out.stdout.is_empty() {
                return Err(PipelineError::Bundle(format!("`{cmd}` produced no output")));
            }
            Ok(out.stdout)
        })
    }
}
