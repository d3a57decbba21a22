// src/pipeline/build.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::BuildSection;
use crate::dag::{RunContext, RunFuture, TaskRunner};
use crate::errors::PipelineError;
use crate::pipeline::writer::ArtifactWriter;
use crate::pipeline::{file_name, under_root};
use crate::reload::ReloadChannel;
use crate::tools::{Bundler, Minifier};

/// Output locations of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutputs {
    pub bundle: PathBuf,
    pub minified: PathBuf,
    pub source_map: PathBuf,
}

impl BuildOutputs {
    pub fn from_config(cfg: &BuildSection, root: &Path) -> Self {
        Self {
            bundle: under_root(root, &cfg.bundle_path()),
            minified: under_root(root, &cfg.minified_path()),
            source_map: under_root(root, &cfg.source_map_path()),
        }
    }
}

/// bundle -> minify -> write all three artifacts -> publish reload.
///
/// Nothing is written unless both the bundler and the minifier succeed, and
/// the three files are written as one staged group, so a failed run leaves
/// the previous build's artifacts in place together.
pub struct BuildPipeline {
    entry: PathBuf,
    outputs: BuildOutputs,
    bundler: Arc<dyn Bundler>,
    minifier: Arc<dyn Minifier>,
    writer: ArtifactWriter,
    reload: ReloadChannel,
}

impl BuildPipeline {
    pub fn new(
        entry: impl Into<PathBuf>,
        outputs: BuildOutputs,
        bundler: Arc<dyn Bundler>,
        minifier: Arc<dyn Minifier>,
        writer: ArtifactWriter,
        reload: ReloadChannel,
    ) -> Self {
        Self {
            entry: entry.into(),
            outputs,
            bundler,
            minifier,
            writer,
            reload,
        }
    }

    pub fn outputs(&self) -> &BuildOutputs {
        &self.outputs
    }

    async fn build(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let bundle = self.bundler.bundle(&self.entry).await?;

        let minifier = Arc::clone(&self.minifier);
        let source_name = file_name(&self.outputs.bundle);
        let input = bundle.clone();
        let minified = tokio::task::spawn_blocking(move || minifier.minify(&input, &source_name))
            .await
            .map_err(|e| PipelineError::Minify(format!("minifier task failed: {e}")))??;

        let mut min_code = minified.code;
        min_code.extend_from_slice(
            format!(
                "\n//# sourceMappingURL={}\n",
                file_name(&self.outputs.source_map)
            )
            .as_bytes(),
        );

        // The map lands before the code file that points at it.
        self.writer
            .write_all(&[
                (self.outputs.bundle.as_path(), bundle.as_slice()),
                (self.outputs.source_map.as_path(), minified.map.as_slice()),
                (self.outputs.minified.as_path(), min_code.as_slice()),
            ])
            .await?;

        let event = self.reload.publish();
        info!(
            task = %ctx.task,
            run_id = ctx.run_id,
            bundle_bytes = bundle.len(),
            minified_bytes = min_code.len(),
            reload_seq = event.seq,
            "build artifacts written"
        );
        Ok(())
    }
}

impl TaskRunner for BuildPipeline {
    fn run<'a>(&'a self, ctx: &'a RunContext) -> RunFuture<'a> {
        Box::pin(self.build(ctx))
    }
}
