//! Scene illustrations from a text-to-image diffusion endpoint.
//!
//! The backend follows the Hugging Face inference contract: `POST {base}/models/{model}` with
//! `{"inputs": prompt, "parameters": {...}}`, answered with raw encoded image bytes. Decoding
//! and PNG encoding run on the blocking pool.

use crate::config::MediaSettings;
use async_trait::async_trait;
use image::ImageFormat;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::path::Path;
use thiserror::Error;

/// One image to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    /// Full prompt, style prefix included.
    pub prompt: String,
    /// Deterministic seed for the sampler.
    pub seed: u64,
}

/// Errors produced while generating an illustration.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Diffusion backend could not be reached.
    #[error("image backend unavailable: {0}")]
    Unavailable(String),
    /// Diffusion backend answered with a non-success status.
    #[error("image backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Returned bytes were not a decodable image, or saving failed.
    #[error("image could not be decoded or saved: {0}")]
    Image(#[from] image::ImageError),
    /// Blocking decode task failed.
    #[error("image task failed: {0}")]
    Task(String),
}

/// Renders a prompt into a PNG file.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Render `request` and write a PNG to `destination`.
    async fn generate(&self, request: &ImageRequest, destination: &Path) -> Result<(), ImageError>;
}

/// HTTP diffusion client.
pub struct DiffusionClient {
    http: Client,
    base_url: String,
    model_id: String,
    api_key: Option<String>,
    inference_steps: u32,
    guidance_scale: f32,
}

impl DiffusionClient {
    /// Build a client from media settings.
    pub fn new(settings: &MediaSettings, http: Client) -> Self {
        Self {
            http,
            base_url: settings.sd_url.clone(),
            model_id: settings.sd_model_id.clone(),
            api_key: settings.sd_api_key.clone(),
            inference_steps: settings.inference_steps,
            guidance_scale: settings.guidance_scale,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}",
            self.base_url.trim_end_matches('/'),
            self.model_id.trim_matches('/')
        )
    }
}

#[async_trait]
impl ImageGenerator for DiffusionClient {
    async fn generate(&self, request: &ImageRequest, destination: &Path) -> Result<(), ImageError> {
        tracing::debug!(seed = request.seed, prompt = %request.prompt, "Requesting image");
        let mut builder = self
            .http
            .post(self.endpoint())
            .header(reqwest::header::ACCEPT, "image/png")
            .json(&json!({
                "inputs": request.prompt,
                "parameters": {
                    "num_inference_steps": self.inference_steps,
                    "guidance_scale": self.guidance_scale,
                    "seed": request.seed,
                },
            }));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            ImageError::Unavailable(format!("failed to reach {}: {error}", self.base_url))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Status { status, body });
        }
        let encoded = response
            .bytes()
            .await
            .map_err(|error| ImageError::Unavailable(format!("image stream interrupted: {error}")))?;

        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&encoded)?;
            decoded.save_with_format(&destination, ImageFormat::Png)?;
            tracing::debug!(
                path = %destination.display(),
                width = decoded.width(),
                height = decoded.height(),
                "Illustration written"
            );
            Ok(())
        })
        .await
        .map_err(|error| ImageError::Task(error.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn settings(url: &str) -> MediaSettings {
        MediaSettings {
            tts_url: url.into(),
            tts_api_key: None,
            tts_model: "tts-1".into(),
            tts_voice: "voice".into(),
            sd_url: url.into(),
            sd_model_id: "runwayml/stable-diffusion-v1-5".into(),
            sd_api_key: Some("hf_token".into()),
            inference_steps: 30,
            guidance_scale: 7.5,
            style_prefix: String::new(),
            base_seed: 42,
            image_max_concurrency: 1,
            join_policy: Default::default(),
            work_dir: PathBuf::from("unused"),
            output_dir: PathBuf::from("unused"),
            ffmpeg_bin: "ffmpeg".into(),
            ffprobe_bin: "ffprobe".into(),
        }
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgb([200, 120, 40]));
        let mut bytes = Cursor::new(Vec::new());
        buffer
            .write_to(&mut bytes, ImageFormat::Jpeg)
            .expect("encode jpeg");
        bytes.into_inner()
    }

    #[tokio::test]
    async fn response_is_reencoded_as_png() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/runwayml/stable-diffusion-v1-5")
                    .header("authorization", "Bearer hf_token")
                    .json_body_partial(
                        r#"{"inputs":"a kettle","parameters":{"num_inference_steps":30,"seed":7}}"#,
                    );
                then.status(200)
                    .header("content-type", "image/jpeg")
                    .body(jpeg_bytes(16, 8));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = dir.path().join("scene.png");

        DiffusionClient::new(&settings(&server.base_url()), Client::new())
            .generate(
                &ImageRequest {
                    prompt: "a kettle".into(),
                    seed: 7,
                },
                &destination,
            )
            .await
            .expect("generate");

        mock.assert_async().await;
        let (width, height) = image::image_dimensions(&destination).expect("png dims");
        assert_eq!((width, height), (16, 8));
        let written = std::fs::read(&destination).expect("png bytes");
        assert!(written.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_an_image_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/runwayml/stable-diffusion-v1-5");
                then.status(200).body("not an image");
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");

        let error = DiffusionClient::new(&settings(&server.base_url()), Client::new())
            .generate(
                &ImageRequest {
                    prompt: "x".into(),
                    seed: 1,
                },
                &dir.path().join("scene.png"),
            )
            .await
            .expect_err("decode error");

        assert!(matches!(error, ImageError::Image(_)));
    }

    #[tokio::test]
    async fn model_loading_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/runwayml/stable-diffusion-v1-5");
                then.status(503).body(r#"{"error":"Model is currently loading"}"#);
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");

        let error = DiffusionClient::new(&settings(&server.base_url()), Client::new())
            .generate(
                &ImageRequest {
                    prompt: "x".into(),
                    seed: 1,
                },
                &dir.path().join("scene.png"),
            )
            .await
            .expect_err("status");

        assert!(matches!(error, ImageError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE));
    }
}
