//! End-to-end orchestration: script, scene synthesis, then assembly.

use crate::metrics::ServiceMetrics;
use crate::video::{
    assemble::{Assemble, AssemblyError},
    script::{DEFAULT_TITLE, Script, ScriptError, ScriptGenerator, ValidationError},
    synth::{SceneSynthesizer, SynthesisError},
    workspace::ScratchDir,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Where a run gets its script from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptSource {
    /// Caller-supplied script, used as is.
    Script(Script),
    /// Context text to turn into a script first.
    Context {
        /// Source material.
        context: String,
        /// Title for the generated script.
        title: String,
    },
}

impl ScriptSource {
    /// Pick a source from optional request fields; exactly one of `script` and `context` must
    /// be present.
    pub fn from_request(
        script: Option<Script>,
        context: Option<String>,
        title: Option<String>,
    ) -> Result<Self, ValidationError> {
        let context = context.filter(|text| !text.trim().is_empty());
        match (script, context) {
            (Some(_), Some(_)) => Err(ValidationError::ConflictingSources),
            (None, None) => Err(ValidationError::MissingSource),
            (Some(script), None) => {
                script.validate()?;
                Ok(Self::Script(script))
            }
            (None, Some(context)) => Ok(Self::Context {
                context,
                title: title
                    .filter(|title| !title.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            }),
        }
    }
}

/// Failures of a video run, tagged by stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Request was malformed.
    #[error("{0}")]
    Validation(#[from] ValidationError),
    /// Script generation failed.
    #[error("Script generation failed: {0}")]
    Script(#[from] ScriptError),
    /// Audio or image synthesis failed.
    #[error("Media generation failed: {0}")]
    Synthesis(#[from] SynthesisError),
    /// Muxing or concatenation failed.
    #[error("Media generation failed: {0}")]
    Assembly(#[from] AssemblyError),
    /// Per-run directory could not be created.
    #[error("Media generation failed: could not prepare run directory: {0}")]
    Workspace(#[source] std::io::Error),
}

/// Video generation as seen by the HTTP surface.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Run the pipeline and return the written video path.
    async fn generate_video(&self, source: ScriptSource) -> Result<PathBuf, PipelineError>;
}

/// Owns the per-stage services for video runs.
///
/// Each run works inside its own scratch directory under `work_dir`, so concurrent runs never
/// share intermediate files.
pub struct VideoPipeline {
    generator: ScriptGenerator,
    synthesizer: SceneSynthesizer,
    assembler: Arc<dyn Assemble>,
    base_seed: u64,
    work_dir: PathBuf,
    metrics: Arc<ServiceMetrics>,
}

impl VideoPipeline {
    /// Wire the stages together.
    pub fn new(
        generator: ScriptGenerator,
        synthesizer: SceneSynthesizer,
        assembler: Arc<dyn Assemble>,
        base_seed: u64,
        work_dir: PathBuf,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            assembler,
            base_seed,
            work_dir,
            metrics,
        }
    }

    /// Produce a video from `source`, writing to `output_path` or a generated name.
    pub async fn run(
        &self,
        source: ScriptSource,
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf, PipelineError> {
        let run = ScratchDir::create(&self.work_dir, "run")
            .await
            .map_err(PipelineError::Workspace)?;
        let span = tracing::info_span!("video_run", run_dir = %run.path().display());

        let result = async {
            let script = self.resolve_script(source).await?;
            tracing::info!(
                title = script.title.as_deref().unwrap_or(DEFAULT_TITLE),
                scenes = script.scenes.len(),
                "Script ready"
            );

            let artifacts = self
                .synthesizer
                .synthesize(&script.scenes, self.base_seed, run.path())
                .await?;
            let video = self.assembler.assemble(&artifacts, output_path).await?;

            self.metrics.record_video();
            tracing::info!(video = %video.display(), "Video run complete");
            Ok::<_, PipelineError>(video)
        }
        .instrument(span)
        .await;
        run.close().await;
        result
    }

    async fn resolve_script(&self, source: ScriptSource) -> Result<Script, PipelineError> {
        match source {
            ScriptSource::Script(script) => {
                script.validate()?;
                Ok(script)
            }
            ScriptSource::Context { context, title } => {
                if context.trim().is_empty() {
                    return Err(ValidationError::MissingSource.into());
                }
                let script = self.generator.generate_script(&context, &title).await?;
                script.validate().map_err(ScriptError::Invalid)?;
                Ok(script)
            }
        }
    }
}

#[async_trait]
impl VideoApi for VideoPipeline {
    async fn generate_video(&self, source: ScriptSource) -> Result<PathBuf, PipelineError> {
        self.run(source, None).await
    }
}
