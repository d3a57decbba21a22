// src/pipeline/suite.rs

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::{RunContext, RunFuture, TaskRunner};
use crate::errors::PipelineError;
use crate::tools::TestRunner;

/// Runs the test-spec files and logs a per-file line plus a summary.
///
/// A failing suite fails the run (so `buildwatch test` exits non-zero) but
/// never affects other tasks.
pub struct TestPipeline {
    runner: Arc<dyn TestRunner>,
    specs: String,
}

impl TestPipeline {
    pub fn new(runner: Arc<dyn TestRunner>, specs: impl Into<String>) -> Self {
        Self {
            runner,
            specs: specs.into(),
        }
    }

    async fn run_suite(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let results = match self.runner.run(&self.specs).await {
            Ok(results) => results,
            Err(err) => {
                warn!(
                    task = %ctx.task,
                    run_id = ctx.run_id,
                    specs = %self.specs,
                    passed = 0usize,
                    failed = 0usize,
                    error = %err,
                    "test summary"
                );
                return Err(err);
            }
        };

        let mut failed = 0usize;
        for result in &results {
            if result.passed {
                info!(file = ?result.file, "passed");
                for line in &result.log_lines {
                    debug!(file = ?result.file, "{line}");
                }
            } else {
                failed += 1;
                warn!(file = ?result.file, "failed");
                for line in &result.log_lines {
                    warn!(file = ?result.file, "{line}");
                }
            }
        }

        let passed = results.len() - failed;
        if failed == 0 && !results.is_empty() {
            info!(task = %ctx.task, run_id = ctx.run_id, passed, failed, "test summary");
        } else {
            warn!(
                task = %ctx.task,
                run_id = ctx.run_id,
                specs = %self.specs,
                passed,
                failed,
                no_spec_files = results.is_empty(),
                "test summary"
            );
        }

        if failed > 0 {
            return Err(PipelineError::TestRun(format!(
                "{failed} of {} spec files failed",
                results.len()
            )));
        }
        Ok(())
    }
}

impl TaskRunner for TestPipeline {
    fn run<'a>(&'a self, ctx: &'a RunContext) -> RunFuture<'a> {
        Box::pin(self.run_suite(ctx))
    }
}
