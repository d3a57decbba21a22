// src/pipeline/schema.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::dag::{RunContext, RunFuture, TaskRunner};
use crate::errors::PipelineError;
use crate::pipeline::writer::ArtifactWriter;
use crate::tools::SchemaGenerator;

/// Captures the generator's output and writes it verbatim to `output`.
///
/// The capture must be a JSON document; anything else is treated as a
/// failed capture and the previous output file stays as it was.
pub struct SchemaPipeline {
    generator: Arc<dyn SchemaGenerator>,
    writer: ArtifactWriter,
    output: PathBuf,
}

impl SchemaPipeline {
    pub fn new(generator: Arc<dyn SchemaGenerator>, writer: ArtifactWriter, output: impl Into<PathBuf>) -> Self {
        Self {
            generator,
            writer,
            output: output.into(),
        }
    }

    async fn regenerate(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let captured = self.generator.generate().await?;

        if let Err(e) = serde_json::from_slice::<serde_json::Value>(&captured) {
            return Err(PipelineError::SchemaSubprocess(format!(
                "generator output is not a JSON document ({} bytes): {e}",
                captured.len()
            )));
        }

        let written = self.writer.write(&self.output, &captured).await?;
        info!(
            task = %ctx.task,
            run_id = ctx.run_id,
            output = ?self.output,
            bytes = captured.len(),
            written,
            "schema regenerated"
        );
        Ok(())
    }
}

impl TaskRunner for SchemaPipeline {
    fn run<'a>(&'a self, ctx: &'a RunContext) -> RunFuture<'a> {
        Box::pin(self.regenerate(ctx))
    }
}
