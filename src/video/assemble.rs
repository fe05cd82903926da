//! Still-image + narration clips muxed with `ffmpeg` and concatenated into one MP4.
//!
//! Every clip is encoded with identical parameters (canvas, frame rate, codecs) so the final
//! concat step can stream-copy instead of re-encoding.

use crate::video::{synth::SceneArtifacts, workspace::{ScratchDir, short_token}};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Frame rate of every produced video.
pub const VIDEO_FPS: u32 = 24;

const MIN_CLIP_SECONDS: f64 = 0.5;
const STDERR_TAIL_CHARS: usize = 800;

/// Failures while turning scene media into a video.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// No scene pairs were supplied.
    #[error("no clips to assemble")]
    NoClips,
    /// An input file does not exist.
    #[error("missing input file {}", .0.display())]
    MissingInput(PathBuf),
    /// Audio duration could not be determined.
    #[error("could not probe duration of {}: {detail}", path.display())]
    Probe {
        /// Audio file being probed.
        path: PathBuf,
        /// Probe output or parse failure.
        detail: String,
    },
    /// Image dimensions could not be read.
    #[error("could not read image {}: {source}", path.display())]
    Dimensions {
        /// Image being measured.
        path: PathBuf,
        /// Decoder error.
        source: image::ImageError,
    },
    /// External tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Executable name.
        program: String,
        /// Spawn error.
        source: std::io::Error,
    },
    /// External tool exited unsuccessfully.
    #[error("ffmpeg {stage} failed: {stderr}")]
    Encode {
        /// Which step failed (`clip N` or `concat`).
        stage: String,
        /// Tail of the tool's stderr.
        stderr: String,
    },
    /// Filesystem failure around the output or scratch files.
    #[error("assembly I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Blocking helper task failed.
    #[error("assembly task failed: {0}")]
    Task(String),
}

/// Turns ordered scene media into a single video file.
#[async_trait]
pub trait Assemble: Send + Sync {
    /// Assemble `scenes` in order; writes to `output_path` or a generated name.
    async fn assemble(
        &self,
        scenes: &[SceneArtifacts],
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf, AssemblyError>;
}

/// Executables and locations used by [`VideoAssembler`].
#[derive(Debug, Clone)]
pub struct AssemblySettings {
    /// `ffmpeg` executable.
    pub ffmpeg_bin: String,
    /// `ffprobe` executable.
    pub ffprobe_bin: String,
    /// Directory for generated output names.
    pub output_dir: PathBuf,
}

/// `ffmpeg`-backed assembler.
pub struct VideoAssembler {
    settings: AssemblySettings,
}

impl VideoAssembler {
    /// Build an assembler.
    pub fn new(settings: AssemblySettings) -> Self {
        Self { settings }
    }

    async fn probe_duration(&self, audio: &Path) -> Result<f64, AssemblyError> {
        let output = Command::new(&self.settings.ffprobe_bin)
            .args(probe_args(audio))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AssemblyError::Spawn {
                program: self.settings.ffprobe_bin.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(AssemblyError::Probe {
                path: audio.to_path_buf(),
                detail: stderr_tail(&output.stderr),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = text.trim().parse().map_err(|_| AssemblyError::Probe {
            path: audio.to_path_buf(),
            detail: format!("unexpected ffprobe output '{}'", text.trim()),
        })?;
        if !seconds.is_finite() || seconds < MIN_CLIP_SECONDS {
            tracing::warn!(
                path = %audio.display(),
                seconds,
                "Narration shorter than minimum clip length"
            );
            return Ok(MIN_CLIP_SECONDS);
        }
        Ok(seconds)
    }

    async fn run_ffmpeg(&self, stage: String, args: Vec<String>) -> Result<(), AssemblyError> {
        tracing::debug!(stage = %stage, args = ?args, "Running ffmpeg");
        let output = Command::new(&self.settings.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AssemblyError::Spawn {
                program: self.settings.ffmpeg_bin.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(AssemblyError::Encode {
                stage,
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }

    async fn encode_clips(
        &self,
        scenes: &[SceneArtifacts],
        (width, height): (u32, u32),
        clips: &Path,
        output: &Path,
    ) -> Result<(), AssemblyError> {
        let mut manifest = String::new();
        for (index, scene) in scenes.iter().enumerate() {
            let duration = self.probe_duration(&scene.audio_path).await?;
            let clip_name = format!("clip_{index:03}.mp4");
            let args = clip_args(
                &scene.image_path,
                &scene.audio_path,
                duration,
                (width, height),
                &clips.join(&clip_name),
            );
            self.run_ffmpeg(format!("clip {index}"), args).await?;
            manifest.push_str(&format!("file '{clip_name}'\n"));
            tracing::debug!(index, duration, "Clip encoded");
        }

        let manifest_path = clips.join("concat.txt");
        tokio::fs::write(&manifest_path, manifest).await?;
        self.run_ffmpeg("concat".into(), concat_args(&manifest_path, output))
            .await
    }

    async fn resolve_output(&self, requested: Option<PathBuf>) -> Result<PathBuf, AssemblyError> {
        let path = requested.unwrap_or_else(|| {
            self.settings
                .output_dir
                .join(format!("video_{}.mp4", short_token()))
        });
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(path)
    }
}

#[async_trait]
impl Assemble for VideoAssembler {
    async fn assemble(
        &self,
        scenes: &[SceneArtifacts],
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf, AssemblyError> {
        if scenes.is_empty() {
            return Err(AssemblyError::NoClips);
        }
        for scene in scenes {
            for input in [&scene.audio_path, &scene.image_path] {
                if !tokio::fs::try_exists(input).await.unwrap_or(false) {
                    return Err(AssemblyError::MissingInput(input.clone()));
                }
            }
        }

        let output = self.resolve_output(output_path).await?;
        let images: Vec<PathBuf> = scenes.iter().map(|scene| scene.image_path.clone()).collect();
        let (width, height) = canvas_size(&read_dimensions(images).await?);
        tracing::info!(
            clips = scenes.len(),
            width,
            height,
            output = %output.display(),
            "Assembling video"
        );

        let scratch_parent = output.parent().unwrap_or_else(|| Path::new("."));
        let clips = ScratchDir::create(scratch_parent, ".clips").await?;
        let result = self
            .encode_clips(scenes, (width, height), clips.path(), &output)
            .await;
        clips.close().await;
        result?;

        tracing::info!(output = %output.display(), "Video assembled");
        Ok(output)
    }
}

async fn read_dimensions(images: Vec<PathBuf>) -> Result<Vec<(u32, u32)>, AssemblyError> {
    tokio::task::spawn_blocking(move || {
        images
            .into_iter()
            .map(|path| {
                image::image_dimensions(&path)
                    .map_err(|source| AssemblyError::Dimensions { path, source })
            })
            .collect()
    })
    .await
    .map_err(|error| AssemblyError::Task(error.to_string()))?
}

/// Smallest even canvas that fits every image.
fn canvas_size(dimensions: &[(u32, u32)]) -> (u32, u32) {
    let (width, height) = dimensions
        .iter()
        .fold((2, 2), |(w, h), &(iw, ih)| (w.max(iw), h.max(ih)));
    (width.next_multiple_of(2), height.next_multiple_of(2))
}

fn probe_args(audio: &Path) -> Vec<String> {
    vec![
        "-v".to_owned(),
        "error".to_owned(),
        "-show_entries".to_owned(),
        "format=duration".to_owned(),
        "-of".to_owned(),
        "default=noprint_wrappers=1:nokey=1".to_owned(),
        audio.to_string_lossy().into_owned(),
    ]
}

fn clip_args(
    image: &Path,
    audio: &Path,
    duration: f64,
    (width, height): (u32, u32),
    output: &Path,
) -> Vec<String> {
    let filter = format!(
        "scale={width}:{height}:force_original_aspect_ratio=decrease,\
         pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,format=yuv420p"
    );
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-loop".to_owned(),
        "1".to_owned(),
        "-framerate".to_owned(),
        VIDEO_FPS.to_string(),
        "-i".to_owned(),
        image.to_string_lossy().into_owned(),
        "-i".to_owned(),
        audio.to_string_lossy().into_owned(),
        "-map".to_owned(),
        "0:v:0".to_owned(),
        "-map".to_owned(),
        "1:a:0".to_owned(),
        "-t".to_owned(),
        format!("{duration:.3}"),
        "-vf".to_owned(),
        filter,
        "-r".to_owned(),
        VIDEO_FPS.to_string(),
        "-c:v".to_owned(),
        "libx264".to_owned(),
        "-tune".to_owned(),
        "stillimage".to_owned(),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
        "-c:a".to_owned(),
        "aac".to_owned(),
        "-ar".to_owned(),
        "44100".to_owned(),
        "-ac".to_owned(),
        "2".to_owned(),
        output.to_string_lossy().into_owned(),
    ]
}

fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "concat".to_owned(),
        "-safe".to_owned(),
        "0".to_owned(),
        "-i".to_owned(),
        manifest.to_string_lossy().into_owned(),
        "-c".to_owned(),
        "copy".to_owned(),
        "-movflags".to_owned(),
        "+faststart".to_owned(),
        output.to_string_lossy().into_owned(),
    ]
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(STDERR_TAIL_CHARS);
    chars[start..].iter().collect::<String>().trim().to_owned()
}
