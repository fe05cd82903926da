//! HTTP surface for Auto-Didact.
//!
//! This module exposes a compact Axum router consumed by the web front-end:
//!
//! - `GET /` – Liveness probe.
//! - `POST /test-ingest` – Ingest the configured sample PDF into Qdrant.
//! - `POST /test-ask` – Answer a question from the indexed documents.
//! - `POST /generate-video` – Turn a script, or context text, into a narrated MP4.
//! - `GET /metrics` – Observe ingestion, answer and video counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools.
//!
//! Failures are returned as `{"detail": "..."}` with 400 for malformed requests, 404 for a
//! missing sample document and 500 for everything else.

use crate::knowledge::{AskError, IngestError, KnowledgeApi};
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::video::{PipelineError, Script, ScriptSource, VideoApi};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared handles passed to every handler.
pub struct AppState<K, V> {
    knowledge: Arc<K>,
    video: Arc<V>,
    metrics: Arc<ServiceMetrics>,
}

impl<K, V> AppState<K, V> {
    /// Bundle the services behind the router.
    pub fn new(knowledge: Arc<K>, video: Arc<V>, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            knowledge,
            video,
            metrics,
        }
    }
}

impl<K, V> Clone for AppState<K, V> {
    fn clone(&self) -> Self {
        Self {
            knowledge: Arc::clone(&self.knowledge),
            video: Arc::clone(&self.video),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Build the HTTP router.
pub fn create_router<K, V>(state: AppState<K, V>) -> Router
where
    K: KnowledgeApi + 'static,
    V: VideoApi + 'static,
{
    Router::new()
        .route("/", get(health_check))
        .route("/test-ingest", post(ingest_sample::<K, V>))
        .route("/test-ask", post(ask_question::<K, V>))
        .route("/generate-video", post(generate_video::<K, V>))
        .route("/metrics", get(get_metrics::<K, V>))
        .route("/commands", get(get_commands))
        .with_state(state)
}

/// CORS policy admitting the front-end origin; `*` admits any origin.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }
    Ok(layer.allow_origin(HeaderValue::from_str(origin.trim())?))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "Backend is running!", "project": "Auto-Didact" }))
}

/// Success response for `POST /test-ingest`.
#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    chunks_uploaded: usize,
}

async fn ingest_sample<K, V>(
    State(state): State<AppState<K, V>>,
) -> Result<Json<IngestResponse>, AppError>
where
    K: KnowledgeApi,
{
    let outcome = state.knowledge.ingest_sample().await?;
    tracing::info!(
        chunks = outcome.chunks_uploaded,
        pages = outcome.pages,
        "Sample ingestion completed"
    );
    Ok(Json(IngestResponse {
        status: "Success",
        chunks_uploaded: outcome.chunks_uploaded,
    }))
}

/// Request body for `POST /test-ask`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn ask_question<K, V>(
    State(state): State<AppState<K, V>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<crate::knowledge::Answer>, AppError>
where
    K: KnowledgeApi,
{
    Ok(Json(state.knowledge.answer(&request.question).await?))
}

/// Request body for `POST /generate-video`: a ready script, or context to write one from.
#[derive(Deserialize)]
struct VideoRequest {
    #[serde(default)]
    script: Option<Script>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Success response for `POST /generate-video`.
#[derive(Serialize)]
struct VideoResponse {
    status: &'static str,
    video_path: String,
}

async fn generate_video<K, V>(
    State(state): State<AppState<K, V>>,
    Json(request): Json<VideoRequest>,
) -> Result<Json<VideoResponse>, AppError>
where
    V: VideoApi,
{
    let source = ScriptSource::from_request(request.script, request.context, request.title)
        .map_err(PipelineError::from)?;
    let path = state.video.generate_video(source).await?;
    Ok(Json(VideoResponse {
        status: "success",
        video_path: path.display().to_string(),
    }))
}

async fn get_metrics<K, V>(State(state): State<AppState<K, V>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "ingest_sample",
                method: "POST",
                path: "/test-ingest",
                description: "Extract, chunk and embed the configured sample PDF into Qdrant. Returns { \"status\": \"Success\", \"chunks_uploaded\": number }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/test-ask",
                description: "Answer a question strictly from the indexed documents, with source previews.",
                request_example: Some(json!({ "question": "At what temperature does water boil?" })),
            },
            CommandDescriptor {
                name: "generate_video",
                method: "POST",
                path: "/generate-video",
                description: "Render a narrated MP4 from a script, or from context text via a generated script. Provide exactly one of 'script' or 'context'.",
                request_example: Some(json!({
                    "context": "Water boils at 100°C at sea level.",
                    "title": "Boiling Point"
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return service counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

/// Error rendered as `{"detail": ...}` with a mapped status code.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "Request failed");
        } else {
            tracing::warn!(status = %self.status, detail = %self.detail, "Request rejected");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(error: IngestError) -> Self {
        let status = match error {
            IngestError::MissingSource(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: error.to_string(),
        }
    }
}

impl From<AskError> for AppError {
    fn from(error: AskError) -> Self {
        let status = match error {
            AskError::EmptyQuestion => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: error.to_string(),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(error: PipelineError) -> Self {
        let status = match error {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: error.to_string(),
        }
    }
}
