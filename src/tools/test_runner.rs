// src/tools/test_runner.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::errors::PipelineError;
use crate::fs::FileSystem;
use crate::tools::command::{run_captured, substitute};
use crate::tools::{BoxFuture, TestFileResult, TestRunner};
use crate::watch::patterns::{collect_matching_files, GlobMatcher};

/// Runs a test command once per spec file (e.g.
/// `mocha --reporter list {file}`). A file passes when the command exits 0.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    cmd_template: String,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl CommandTestRunner {
    pub fn new(cmd_template: impl Into<String>, root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            cmd_template: cmd_template.into(),
            root: root.into(),
            fs,
        }
    }
}

impl TestRunner for CommandTestRunner {
    fn run<'a>(&'a self, glob: &'a str) -> BoxFuture<'a, Result<Vec<TestFileResult>, PipelineError>> {
        Box::pin(async move {
            let matcher =
                GlobMatcher::new(glob).map_err(|e| PipelineError::TestRun(e.to_string()))?;
            let files = collect_matching_files(self.fs.as_ref(), &self.root, &matcher)
                .map_err(|e| PipelineError::TestRun(format!("listing spec files: {e:#}")))?;
            debug!(glob, count = files.len(), "collected spec files");

            let mut results = Vec::with_capacity(files.len());
            for file in files {
                let rel = file.strip_prefix(&self.root).unwrap_or(&file).to_path_buf();
                let cmd = substitute(&self.cmd_template, "file", &rel.to_string_lossy());
                let out = run_captured(&cmd, &self.root)
                    .await
                    .map_err(|e| PipelineError::TestRun(format!("{e:#}")))?;
                results.push(TestFileResult {
                    file: rel,
                    passed: out.success,
                    log_lines: out.log_lines(),
                });
            }
            Ok(results)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;

    #[tokio::test]
    async fn one_result_per_spec_file_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("test")).unwrap();
        std::fs::write(dir.path().join("test/b.spec.js"), "fail").unwrap();
        std::fs::write(dir.path().join("test/a.spec.js"), "pass").unwrap();
        std::fs::write(dir.path().join("test/helper.js"), "pass").unwrap();

        // Passes iff the file contains "pass".
        let runner = CommandTestRunner::new(
            "cat {file}; grep -q pass {file}",
            dir.path(),
            Arc::new(RealFileSystem),
        );
        let results = runner.run("test/*.spec.js").await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file, PathBuf::from("test/a.spec.js"));
        assert!(results[0].passed);
        assert_eq!(results[0].log_lines, vec!["pass"]);
        assert_eq!(results[1].file, PathBuf::from("test/b.spec.js"));
        assert!(!results[1].passed);
    }
}
