//! Script model, validation and the language-model backed script generator.
//!
//! Model output is decoded in exactly two stages: a strict decode of the (fence-stripped) text,
//! then a strict decode of the span between the first `{` and the last `}`. Nothing more
//! tolerant is attempted, so genuinely malformed scripts still fail loudly.

use crate::llm::{CompletionRequest, LanguageModel, LanguageModelError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Title used when the caller does not provide one.
pub const DEFAULT_TITLE: &str = "Auto-Didact Video";

/// Caller-supplied scene identifier: a number or a free-form name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SceneId {
    /// Numeric identifier, e.g. `1` or `-1`.
    Number(i64),
    /// Textual identifier, e.g. `"intro"`.
    Name(String),
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// One narrated beat of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Optional identifier; generated during synthesis when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SceneId>,
    /// Text spoken by the narrator (1–2 sentences).
    pub narrator_text: String,
    /// Description of the illustration shown while the narration plays.
    pub image_prompt: String,
}

/// Ordered blueprint for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Script {
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Scenes in playback order.
    pub scenes: Vec<Scene>,
}

/// Malformed or contradictory video requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Neither a script nor context text was supplied.
    #[error("Provide either 'script' or 'context'.")]
    MissingSource,
    /// Both a script and context text were supplied.
    #[error("Provide only one of 'script' or 'context'.")]
    ConflictingSources,
    /// The script has no scenes.
    #[error("script must contain at least one scene")]
    NoScenes,
    /// A scene has blank narration.
    #[error("scene {scene} has empty narrator_text")]
    EmptyNarration {
        /// Zero-based scene index.
        scene: usize,
    },
    /// A scene has a blank image prompt.
    #[error("scene {scene} has empty image_prompt")]
    EmptyImagePrompt {
        /// Zero-based scene index.
        scene: usize,
    },
}

impl Script {
    /// Check the invariants every script must satisfy before synthesis.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.scenes.is_empty() {
            return Err(ValidationError::NoScenes);
        }
        for (scene, item) in self.scenes.iter().enumerate() {
            if item.narrator_text.trim().is_empty() {
                return Err(ValidationError::EmptyNarration { scene });
            }
            if item.image_prompt.trim().is_empty() {
                return Err(ValidationError::EmptyImagePrompt { scene });
            }
        }
        Ok(())
    }
}

/// Failures while obtaining a script from the language model.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Transport or provider failure.
    #[error("{0}")]
    Generation(#[from] LanguageModelError),
    /// Output could not be decoded as a script, even after bracket-span extraction.
    #[error("model output is not a valid script: {source}")]
    Parse {
        /// Error from the strict decode of the fence-stripped output.
        source: serde_json::Error,
        /// Raw model output, for diagnostics.
        raw: String,
    },
    /// Output decoded but contained no scenes.
    #[error("model returned a script without scenes")]
    EmptyScript {
        /// Raw model output, for diagnostics.
        raw: String,
    },
    /// Output decoded but violated a scene invariant.
    #[error("model returned an invalid script: {0}")]
    Invalid(ValidationError),
}

/// Decode a script from raw model output.
pub fn parse_script(raw: &str) -> Result<Script, ScriptError> {
    let cleaned = strip_code_fences(raw);
    let script = match serde_json::from_str::<Script>(cleaned) {
        Ok(script) => script,
        Err(strict) => match brace_span(cleaned).and_then(|span| serde_json::from_str(span).ok()) {
            Some(script) => {
                tracing::debug!("Recovered script from bracket span");
                script
            }
            None => {
                return Err(ScriptError::Parse {
                    source: strict,
                    raw: raw.to_string(),
                });
            }
        },
    };

    if script.scenes.is_empty() {
        return Err(ScriptError::EmptyScript {
            raw: raw.to_string(),
        });
    }
    Ok(script)
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Turns free-text context into a [`Script`] with one language-model call.
#[derive(Clone)]
pub struct ScriptGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl ScriptGenerator {
    /// Wrap a language model client.
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Ask the model for a script grounded in `context`.
    ///
    /// A decoded script without a title inherits `title`. No retries are attempted.
    pub async fn generate_script(&self, context: &str, title: &str) -> Result<Script, ScriptError> {
        tracing::info!(title, context_chars = context.len(), "Generating script");
        let raw = self
            .llm
            .complete(CompletionRequest {
                system: Some(SCRIPT_SYSTEM_PROMPT.to_string()),
                prompt: build_script_prompt(context, title),
                json_mode: true,
            })
            .await?;

        let mut script = parse_script(&raw).inspect_err(|error| {
            tracing::warn!(error = %error, raw = %raw, "Script output rejected");
        })?;
        if script.title.as_deref().is_none_or(|value| value.trim().is_empty()) {
            script.title = Some(title.to_string());
        }
        tracing::info!(scenes = script.scenes.len(), "Script generated");
        Ok(script)
    }
}

const SCRIPT_SYSTEM_PROMPT: &str = "You write scripts for short narrated educational videos. \
You only use facts stated in the provided context and you always reply with a single JSON object.";

fn build_script_prompt(context: &str, title: &str) -> String {
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(Script)).unwrap_or_default();
    format!(
        "Write a video script titled \"{title}\" that explains the context below.\n\
         Rules:\n\
         - Use ONLY information from the context; do not add outside facts.\n\
         - Split the explanation into scenes, in teaching order.\n\
         - Each scene's narrator_text is 1-2 sentences spoken by the narrator.\n\
         - Each scene's image_prompt describes one illustration for that scene.\n\
         Respond with one JSON object matching this JSON schema and nothing else:\n\
         {schema}\n\n\
         <context>\n{context}\n</context>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn sample_script() -> Script {
        Script {
            title: Some("Boiling Point".into()),
            scenes: vec![
                Scene {
                    id: Some(SceneId::Number(1)),
                    narrator_text: "Water boils at 100°C at sea level.".into(),
                    image_prompt: "a kettle boiling on a stove".into(),
                },
                Scene {
                    id: Some(SceneId::Name("altitude".into())),
                    narrator_text: "Higher up, it boils sooner.".into(),
                    image_prompt: "a pot on a mountain top".into(),
                },
            ],
        }
    }

    #[test]
    fn plain_json_round_trips() {
        let script = sample_script();
        let wire = serde_json::to_string(&script).expect("serialize");
        assert_eq!(parse_script(&wire).expect("parse"), script);
    }

    #[test]
    fn fenced_json_round_trips() {
        let script = sample_script();
        let wire = serde_json::to_string_pretty(&script).expect("serialize");
        let fenced = format!("```json\n{wire}\n```");
        assert_eq!(parse_script(&fenced).expect("parse"), script);
        let bare_fence = format!("```\n{wire}\n```\n");
        assert_eq!(parse_script(&bare_fence).expect("parse"), script);
    }

    #[test]
    fn commentary_around_json_is_tolerated() {
        let script = sample_script();
        let wire = serde_json::to_string(&script).expect("serialize");
        let noisy = format!("Sure! Here is your script:\n{wire}\nLet me know if you need changes.");
        assert_eq!(parse_script(&noisy).expect("parse"), script);
        let fenced_noisy = format!("Here you go:\n```json\n{wire}\n```\nEnjoy!");
        assert_eq!(parse_script(&fenced_noisy).expect("parse"), script);
    }

    #[test]
    fn unrecoverable_output_is_a_parse_error_with_raw_text() {
        let raw = "I cannot help with that.";
        match parse_script(raw) {
            Err(ScriptError::Parse { raw: kept, .. }) => assert_eq!(kept, raw),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(matches!(
            parse_script("{ not json at all }"),
            Err(ScriptError::Parse { .. })
        ));
    }

    #[test]
    fn empty_scene_list_is_never_returned() {
        assert!(matches!(
            parse_script(r#"{"title": "T", "scenes": []}"#),
            Err(ScriptError::EmptyScript { .. })
        ));
        assert!(matches!(parse_script("{}"), Err(ScriptError::Parse { .. })));
    }

    #[test]
    fn scene_ids_accept_numbers_strings_and_absence() {
        let script = parse_script(
            r#"{"scenes": [
                {"id": 3, "narrator_text": "a", "image_prompt": "b"},
                {"id": "intro", "narrator_text": "c", "image_prompt": "d"},
                {"narrator_text": "e", "image_prompt": "f"}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(script.title, None);
        assert_eq!(script.scenes[0].id, Some(SceneId::Number(3)));
        assert_eq!(script.scenes[1].id, Some(SceneId::Name("intro".into())));
        assert_eq!(script.scenes[2].id, None);
    }

    #[test]
    fn negative_numeric_ids_parse() {
        let script = parse_script(
            r#"{"title":"T","scenes":[{"id":-1,"narrator_text":"a","image_prompt":"b"}]}"#,
        )
        .expect("parse");
        assert_eq!(script.scenes[0].id, Some(SceneId::Number(-1)));
        assert_eq!(script.scenes[0].id.as_ref().map(ToString::to_string), Some("-1".into()));
    }

    #[test]
    fn validate_rejects_blank_fields() {
        let mut script = sample_script();
        assert_eq!(script.validate(), Ok(()));
        script.scenes[1].image_prompt = "  ".into();
        assert_eq!(
            script.validate(),
            Err(ValidationError::EmptyImagePrompt { scene: 1 })
        );
        script.scenes[0].narrator_text.clear();
        assert_eq!(
            script.validate(),
            Err(ValidationError::EmptyNarration { scene: 0 })
        );
        script.scenes.clear();
        assert_eq!(script.validate(), Err(ValidationError::NoScenes));
    }

    struct CannedModel(String);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<String, LanguageModelError> {
            assert!(request.json_mode);
            assert!(request.prompt.contains("<context>\nWater boils at 100°C at sea level.\n</context>"));
            assert!(request.prompt.contains("narrator_text"));
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn generator_fills_missing_title() {
        let generator = ScriptGenerator::new(Arc::new(CannedModel(
            "```json\n{\"scenes\":[{\"narrator_text\":\"Water boils at 100°C.\",\"image_prompt\":\"kettle\"}]}\n```"
                .into(),
        )));
        let script = generator
            .generate_script("Water boils at 100°C at sea level.", "Boiling Point")
            .await
            .expect("script");
        assert_eq!(script.title.as_deref(), Some("Boiling Point"));
        assert_eq!(script.scenes.len(), 1);
    }

    #[tokio::test]
    async fn generator_surfaces_parse_errors() {
        let generator = ScriptGenerator::new(Arc::new(CannedModel("no json here".into())));
        let error = generator
            .generate_script("Water boils at 100°C at sea level.", DEFAULT_TITLE)
            .await
            .expect_err("parse error");
        assert!(matches!(error, ScriptError::Parse { .. }));
    }
}
