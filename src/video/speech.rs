//! Narration synthesis through an OpenAI-compatible `/audio/speech` endpoint.

use crate::config::MediaSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::path::Path;
use thiserror::Error;

/// Errors produced while synthesizing narration.
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Speech backend could not be reached.
    #[error("speech backend unavailable: {0}")]
    Unavailable(String),
    /// Speech backend answered with a non-success status.
    #[error("speech backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Backend returned no audio bytes.
    #[error("speech backend returned an empty body")]
    EmptyAudio,
    /// Audio could not be written to disk.
    #[error("failed to write audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts narration text into an MP3 file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and write the MP3 to `destination`.
    async fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SpeechError>;
}

/// HTTP speech client speaking the OpenAI `audio/speech` dialect.
pub struct HttpSpeechSynthesizer {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
}

impl HttpSpeechSynthesizer {
    /// Build a client from media settings.
    pub fn new(settings: &MediaSettings, http: Client) -> Self {
        Self {
            http,
            base_url: settings.tts_url.clone(),
            api_key: settings.tts_api_key.clone(),
            model: settings.tts_model.clone(),
            voice: settings.tts_voice.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SpeechError> {
        let mut builder = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "mp3",
        }));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            SpeechError::Unavailable(format!("failed to reach {}: {error}", self.base_url))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status { status, body });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|error| SpeechError::Unavailable(format!("audio stream interrupted: {error}")))?;
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        tokio::fs::write(destination, &audio).await?;
        tracing::debug!(
            path = %destination.display(),
            bytes = audio.len(),
            "Narration written"
        );
        Ok(())
    }
}
