//! Concurrent narration and illustration synthesis for every scene of a script.

use crate::video::{
    illustration::{ImageError, ImageGenerator, ImageRequest},
    join::{GroupFailure, JoinPolicy, TaskGroup},
    script::Scene,
    speech::{SpeechError, SpeechSynthesizer},
    workspace::{generated_scene_id, sanitize_file_stem},
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Media kind produced for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    /// Narration track.
    Audio,
    /// Illustration.
    Image,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::Image => "image",
        })
    }
}

/// Audio and image produced for one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneArtifacts {
    /// Position of the scene in the script.
    pub scene_index: usize,
    /// Scene identifier, generated when the script had none.
    pub scene_id: String,
    /// MP3 narration.
    pub audio_path: PathBuf,
    /// PNG illustration.
    pub image_path: PathBuf,
}

/// Failures of the synthesis stage. Any single failure fails the whole stage.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Narration failed for a scene.
    #[error("audio synthesis failed for scene {scene}: {source}")]
    Speech {
        /// Zero-based scene index.
        scene: usize,
        /// Backend error.
        source: SpeechError,
    },
    /// Illustration failed for a scene.
    #[error("image generation failed for scene {scene}: {source}")]
    Image {
        /// Zero-based scene index.
        scene: usize,
        /// Backend error.
        source: ImageError,
    },
    /// Backend reported success but the file is missing.
    #[error("{modality} for scene {scene} was not written to {}", path.display())]
    MissingArtifact {
        /// Zero-based scene index.
        scene: usize,
        /// Which artifact is missing.
        modality: Modality,
        /// Expected location.
        path: PathBuf,
    },
    /// Run directory could not be prepared.
    #[error("failed to prepare run directory: {0}")]
    Workspace(#[from] std::io::Error),
    /// A synthesis job panicked or the image permit pool was closed.
    #[error("synthesis job aborted: {0}")]
    Aborted(String),
}

/// Backends shared by every run.
///
/// The image permit pool is process-wide so concurrent runs never overload the diffusion
/// backend.
#[derive(Clone)]
pub struct MediaContext {
    speech: Arc<dyn SpeechSynthesizer>,
    images: Arc<dyn ImageGenerator>,
    image_permits: Arc<Semaphore>,
}

impl MediaContext {
    /// Bundle the backends; at most `max_concurrent_images` image requests run at once.
    pub fn new(
        speech: Arc<dyn SpeechSynthesizer>,
        images: Arc<dyn ImageGenerator>,
        max_concurrent_images: usize,
    ) -> Self {
        Self {
            speech,
            images,
            image_permits: Arc::new(Semaphore::new(max_concurrent_images.max(1))),
        }
    }
}

/// Knobs for [`SceneSynthesizer`].
#[derive(Debug, Clone, Default)]
pub struct SynthesisSettings {
    /// Prefix prepended to every image prompt; empty disables it.
    pub style_prefix: String,
    /// Behaviour after the first failing job.
    pub join_policy: JoinPolicy,
}

/// Fans a script out into 2N independent media jobs and joins them.
#[derive(Clone)]
pub struct SceneSynthesizer {
    media: MediaContext,
    settings: SynthesisSettings,
}

impl SceneSynthesizer {
    /// Build a synthesizer over shared backends.
    pub fn new(media: MediaContext, settings: SynthesisSettings) -> Self {
        Self { media, settings }
    }

    /// Produce audio and image for each scene inside `run_dir`.
    ///
    /// Scene `i` is rendered with seed `base_seed + i`. The result is index-aligned with
    /// `scenes`, and every listed file exists when this returns `Ok`.
    pub async fn synthesize(
        &self,
        scenes: &[Scene],
        base_seed: u64,
        run_dir: &Path,
    ) -> Result<Vec<SceneArtifacts>, SynthesisError> {
        tokio::fs::create_dir_all(run_dir).await?;
        tracing::info!(
            scenes = scenes.len(),
            policy = %self.settings.join_policy,
            "Synthesizing scene media"
        );

        let mut group = TaskGroup::new(self.settings.join_policy);
        let mut scene_ids = Vec::with_capacity(scenes.len());
        for (index, scene) in scenes.iter().enumerate() {
            let scene_id = scene
                .id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(generated_scene_id);
            let stem = format!("scene_{index:03}_{}", sanitize_file_stem(&scene_id));
            scene_ids.push(scene_id);

            let speech = Arc::clone(&self.media.speech);
            let narration = scene.narrator_text.clone();
            let audio_path = run_dir.join(format!("{stem}.mp3"));
            group.spawn(async move {
                speech
                    .synthesize(&narration, &audio_path)
                    .await
                    .map_err(|source| SynthesisError::Speech {
                        scene: index,
                        source,
                    })?;
                Ok(audio_path)
            });

            let images = Arc::clone(&self.media.images);
            let permits = Arc::clone(&self.media.image_permits);
            let request = ImageRequest {
                prompt: styled_prompt(&self.settings.style_prefix, &scene.image_prompt),
                seed: scene_seed(base_seed, index),
            };
            let image_path = run_dir.join(format!("{stem}.png"));
            group.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| SynthesisError::Aborted("image permit pool closed".into()))?;
                images
                    .generate(&request, &image_path)
                    .await
                    .map_err(|source| SynthesisError::Image {
                        scene: index,
                        source,
                    })?;
                Ok(image_path)
            });
        }

        let produced = group.join().await.map_err(|failure| match failure {
            GroupFailure::Failed { error, .. } => error,
            GroupFailure::Panicked(message) => SynthesisError::Aborted(message),
        })?;

        let mut artifacts = Vec::with_capacity(scenes.len());
        for ((scene_index, scene_id), pair) in scene_ids
            .into_iter()
            .enumerate()
            .zip(produced.chunks_exact(2))
        {
            let (audio_path, image_path) = (&pair[0], &pair[1]);
            ensure_exists(scene_index, Modality::Audio, audio_path).await?;
            ensure_exists(scene_index, Modality::Image, image_path).await?;
            artifacts.push(SceneArtifacts {
                scene_index,
                scene_id,
                audio_path: audio_path.clone(),
                image_path: image_path.clone(),
            });
        }

        tracing::info!(scenes = artifacts.len(), "Scene media ready");
        Ok(artifacts)
    }
}

fn scene_seed(base_seed: u64, index: usize) -> u64 {
    base_seed.wrapping_add(index as u64)
}

fn styled_prompt(prefix: &str, prompt: &str) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        prompt.trim().to_string()
    } else {
        format!("{prefix}, {}", prompt.trim())
    }
}

async fn ensure_exists(scene: usize, modality: Modality, path: &Path) -> Result<(), SynthesisError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        _ => Err(SynthesisError::MissingArtifact {
            scene,
            modality,
            path: path.to_path_buf(),
        }),
    }
}
