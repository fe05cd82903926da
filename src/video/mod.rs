//! Script-to-video generation: script, per-scene narration and illustration, then muxing.

pub mod assemble;
pub mod illustration;
pub mod join;
pub mod pipeline;
pub mod script;
pub mod speech;
pub mod synth;
mod workspace;

pub use assemble::{Assemble, AssemblyError, AssemblySettings, VIDEO_FPS, VideoAssembler};
pub use illustration::{DiffusionClient, ImageError, ImageGenerator, ImageRequest};
pub use join::{GroupFailure, JoinPolicy, TaskGroup};
pub use pipeline::{PipelineError, ScriptSource, VideoApi, VideoPipeline};
pub use script::{
    DEFAULT_TITLE, Scene, SceneId, Script, ScriptError, ScriptGenerator, ValidationError,
    parse_script,
};
pub use speech::{HttpSpeechSynthesizer, SpeechError, SpeechSynthesizer};
pub use synth::{
    MediaContext, Modality, SceneArtifacts, SceneSynthesizer, SynthesisError, SynthesisSettings,
};
pub use workspace::sanitize_file_stem;
