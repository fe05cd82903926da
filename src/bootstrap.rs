//! Construction of the long-lived services from configuration.

use crate::config::Config;
use crate::embedding::build_embedding_client;
use crate::knowledge::{ChunkingError, KnowledgeService, KnowledgeSettings, chunking::Splitter};
use crate::llm::build_language_model;
use crate::metrics::ServiceMetrics;
use crate::qdrant::{QdrantError, QdrantService};
use crate::video::{
    AssemblySettings, DiffusionClient, HttpSpeechSynthesizer, MediaContext, SceneSynthesizer,
    ScriptGenerator, SynthesisSettings, VideoAssembler, VideoPipeline,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures while wiring services at startup.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Shared HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant URL was rejected.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Chunking settings were rejected.
    #[error("invalid chunking settings: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Services shared by the HTTP router and the CLI.
pub struct Services {
    /// PDF ingestion and grounded answers.
    pub knowledge: Arc<KnowledgeService>,
    /// Script-to-video pipeline.
    pub video: Arc<VideoPipeline>,
    /// Counters shared by both.
    pub metrics: Arc<ServiceMetrics>,
}

/// Build every service from `config`, sharing one HTTP connection pool.
pub fn build_services(config: &Config) -> Result<Services, BootstrapError> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let metrics = Arc::new(ServiceMetrics::new());
    let llm = build_language_model(&config.llm, http.clone());

    let knowledge = KnowledgeService::new(
        build_embedding_client(&config.embedding, http.clone()),
        QdrantService::new(
            http.clone(),
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
        )?,
        Arc::clone(&llm),
        Splitter::for_model(
            &config.embedding.model,
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
        )?,
        KnowledgeSettings {
            collection: config.qdrant_collection_name.clone(),
            vector_size: config.embedding.dimension as u64,
            top_k: config.search_top_k,
            sample_pdf_path: config.sample_pdf_path.clone(),
        },
        Arc::clone(&metrics),
    );

    let media = &config.media;
    let synthesizer = SceneSynthesizer::new(
        MediaContext::new(
            Arc::new(HttpSpeechSynthesizer::new(media, http.clone())),
            Arc::new(DiffusionClient::new(media, http)),
            media.image_max_concurrency,
        ),
        SynthesisSettings {
            style_prefix: media.style_prefix.clone(),
            join_policy: media.join_policy,
        },
    );
    let assembler = VideoAssembler::new(AssemblySettings {
        ffmpeg_bin: media.ffmpeg_bin.clone(),
        ffprobe_bin: media.ffprobe_bin.clone(),
        output_dir: media.output_dir.clone(),
    });
    let video = VideoPipeline::new(
        ScriptGenerator::new(llm),
        synthesizer,
        Arc::new(assembler),
        media.base_seed,
        media.work_dir.clone(),
        Arc::clone(&metrics),
    );

    tracing::debug!(
        work_dir = %media.work_dir.display(),
        output_dir = %media.output_dir.display(),
        join_policy = %media.join_policy,
        "Services initialized"
    );
    Ok(Services {
        knowledge: Arc::new(knowledge),
        video: Arc::new(video),
        metrics,
    })
}
