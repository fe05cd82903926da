//! Language-model clients used for grounded answers and video scripts.
//!
//! Two transports are supported: OpenAI-compatible chat completions (Groq by default) and the
//! Ollama `/api/generate` endpoint. Both are plain HTTP adapters behind [`LanguageModel`], so
//! callers and tests can swap in any implementation.

use crate::config::{LanguageModelSettings, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// Provider was unreachable or the endpoint does not exist.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Language model request failed: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed language model response: {0}")]
    InvalidResponse(String),
}

/// Single-turn completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Optional system instruction.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Ask the provider to constrain output to a JSON object.
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Plain-text completion for `prompt`.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the model's reply to `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError>;
}

/// Build the configured language model client.
pub fn build_language_model(
    settings: &LanguageModelSettings,
    http: Client,
) -> Arc<dyn LanguageModel> {
    tracing::debug!(
        provider = ?settings.provider,
        model = %settings.model,
        base_url = %settings.base_url,
        "Initializing language model client"
    );
    match settings.provider {
        LlmProvider::OpenAI => Arc::new(ChatCompletionsClient {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }),
        LlmProvider::Ollama => Arc::new(OllamaClient {
            http,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }),
    }
}

struct ChatCompletionsClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if request.json_mode
            && let Some(object) = payload.as_object_mut()
        {
            object.insert(
                "response_format".into(),
                json!({ "type": "json_object" }),
            );
        }
        payload
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError> {
        let mut builder = self.http.post(self.endpoint()).json(&self.payload(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|error| {
            LanguageModelError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        let response = check_status(response, || self.endpoint()).await?;
        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LanguageModelError::InvalidResponse("completion had no content".into()))
    }
}

struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaClient {
    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError> {
        let mut payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        if let Some(object) = payload.as_object_mut() {
            if let Some(system) = &request.system {
                object.insert("system".into(), Value::String(system.clone()));
            }
            if request.json_mode {
                object.insert("format".into(), Value::String("json".into()));
            }
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let response = check_status(response, || self.endpoint()).await?;
        let body: OllamaResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(LanguageModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }
        Ok(body.response.trim().to_string())
    }
}

async fn check_status<F>(
    response: reqwest::Response,
    endpoint: F,
) -> Result<reqwest::Response, LanguageModelError>
where
    F: FnOnce() -> String,
{
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(LanguageModelError::ProviderUnavailable(format!(
            "endpoint {} returned 404",
            endpoint()
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LanguageModelError::GenerationFailed(format!(
            "provider returned {status}: {body}"
        )));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn chat_client(base_url: String) -> ChatCompletionsClient {
        ChatCompletionsClient {
            http: Client::new(),
            base_url,
            api_key: Some("gsk-test".into()),
            model: "llama3-8b-8192".into(),
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn chat_client_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer gsk-test")
                    .json_body_partial(r#"{"response_format":{"type":"json_object"}}"#);
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "  {\"a\":1}  " } }]
                }));
            })
            .await;

        let reply = chat_client(server.base_url())
            .complete(CompletionRequest {
                system: Some("be terse".into()),
                prompt: "json please".into(),
                json_mode: true,
            })
            .await
            .expect("reply");

        mock.assert_async().await;
        assert_eq!(reply, "{\"a\":1}");
    }

    #[tokio::test]
    async fn chat_client_maps_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let error = chat_client(server.base_url())
            .complete(CompletionRequest::text("hi"))
            .await
            .expect_err("error response");
        assert!(
            matches!(error, LanguageModelError::GenerationFailed(ref message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"format":"json","stream":false}"#);
                then.status(200).json_body(json!({
                    "response": " {\"title\":\"x\"} ",
                    "done": true
                }));
            })
            .await;
        let client = OllamaClient {
            http: Client::new(),
            base_url: server.base_url(),
            model: "llama3".into(),
            temperature: 0.5,
        };

        let reply = client
            .complete(CompletionRequest {
                system: None,
                prompt: "script".into(),
                json_mode: true,
            })
            .await
            .expect("reply");

        mock.assert_async().await;
        assert_eq!(reply, "{\"title\":\"x\"}");
    }

    #[tokio::test]
    async fn missing_endpoint_is_reported_as_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404);
            })
            .await;
        let client = OllamaClient {
            http: Client::new(),
            base_url: server.base_url(),
            model: "llama3".into(),
            temperature: 0.5,
        };

        let error = client
            .complete(CompletionRequest::text("hi"))
            .await
            .expect_err("404");
        assert!(matches!(error, LanguageModelError::ProviderUnavailable(_)));
    }
}
