use crate::video::JoinPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_COLLECTION: &str = "documents";
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_GROQ_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "llama3-8b-8192";
const DEFAULT_STYLE_PREFIX: &str = "educational illustration, clean, simple";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value that failed to parse.
        value: String,
    },
    /// Configuration was already installed for this process.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the Auto-Didact backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores document chunks.
    pub qdrant_url: String,
    /// Collection holding the embedded chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding backend settings.
    pub embedding: EmbeddingSettings,
    /// Token budget per chunk.
    pub text_splitter_chunk_size: usize,
    /// Token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of neighbours retrieved for an answer.
    pub search_top_k: usize,
    /// Language model used for answers and scripts.
    pub llm: LanguageModelSettings,
    /// Speech, diffusion and muxing settings for the video pipeline.
    pub media: MediaSettings,
    /// PDF ingested by `POST /test-ingest`.
    pub sample_pdf_path: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Timeout applied to every outbound HTTP request, in seconds.
    pub http_timeout_secs: u64,
    /// Origin allowed by the CORS layer.
    pub cors_allow_origin: String,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime (`/api/embed`).
    Ollama,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAI,
    /// Deterministic in-process hashing encoder, for offline runs.
    Hash,
}

/// Connection details for the embedding backend.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Provider selection.
    pub provider: EmbeddingProvider,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Dimensionality of the produced vectors.
    pub dimension: usize,
    /// Base URL of the provider.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions (Groq, OpenAI, vLLM, ...).
    OpenAI,
    /// Local Ollama runtime (`/api/generate`).
    Ollama,
}

/// Connection details for the language model.
#[derive(Debug, Clone)]
pub struct LanguageModelSettings {
    /// Provider selection.
    pub provider: LlmProvider,
    /// Base URL of the provider.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Settings consumed by the script-to-video pipeline.
#[derive(Debug, Clone)]
pub struct MediaSettings {
    /// Base URL of the OpenAI-compatible speech endpoint.
    pub tts_url: String,
    /// Optional bearer token for the speech endpoint.
    pub tts_api_key: Option<String>,
    /// Speech model identifier.
    pub tts_model: String,
    /// Narrator voice.
    pub tts_voice: String,
    /// Base URL of the diffusion inference endpoint.
    pub sd_url: String,
    /// Diffusion model identifier.
    pub sd_model_id: String,
    /// Optional bearer token for the diffusion endpoint.
    pub sd_api_key: Option<String>,
    /// Denoising steps per image.
    pub inference_steps: u32,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
    /// Prefix prepended to every image prompt.
    pub style_prefix: String,
    /// Seed of the first scene; scene `i` uses `base_seed + i`.
    pub base_seed: u64,
    /// Number of image requests allowed in flight across all runs.
    pub image_max_concurrency: usize,
    /// Behaviour of the synthesis task group after a failure.
    pub join_policy: JoinPolicy,
    /// Root of the per-run working directories.
    pub work_dir: PathBuf,
    /// Directory receiving finished videos.
    pub output_dir: PathBuf,
    /// `ffmpeg` executable.
    pub ffmpeg_bin: String,
    /// `ffprobe` executable.
    pub ffprobe_bin: String,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider = parse_env_or("EMBEDDING_PROVIDER", EmbeddingProvider::Ollama)?;
        let embedding_default_url = match embedding_provider {
            EmbeddingProvider::OpenAI => DEFAULT_OPENAI_URL,
            EmbeddingProvider::Ollama | EmbeddingProvider::Hash => DEFAULT_OLLAMA_URL,
        };
        let llm_provider = parse_env_or("LLM_PROVIDER", LlmProvider::OpenAI)?;
        let llm_default_url = match llm_provider {
            LlmProvider::OpenAI => DEFAULT_GROQ_URL,
            LlmProvider::Ollama => DEFAULT_OLLAMA_URL,
        };

        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env_or("QDRANT_COLLECTION_NAME", DEFAULT_COLLECTION),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding: EmbeddingSettings {
                provider: embedding_provider,
                model: load_env_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
                dimension: parse_env_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
                base_url: load_env_or("EMBEDDING_URL", embedding_default_url),
                api_key: load_env_optional("EMBEDDING_API_KEY"),
            },
            text_splitter_chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            text_splitter_chunk_overlap: parse_env_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            search_top_k: parse_env_or("SEARCH_TOP_K", DEFAULT_TOP_K)?,
            llm: LanguageModelSettings {
                provider: llm_provider,
                base_url: load_env_or("LLM_URL", llm_default_url),
                api_key: load_env_optional("LLM_API_KEY")
                    .or_else(|| load_env_optional("GROQ_API_KEY")),
                model: load_env_or("LLM_MODEL", DEFAULT_LLM_MODEL),
                temperature: parse_env_or("LLM_TEMPERATURE", 0.5)?,
            },
            media: MediaSettings {
                tts_url: load_env_or("TTS_URL", "http://127.0.0.1:5050/v1"),
                tts_api_key: load_env_optional("TTS_API_KEY"),
                tts_model: load_env_or("TTS_MODEL", "tts-1"),
                tts_voice: load_env_or("TTS_VOICE", "en-US-GuyNeural"),
                sd_url: load_env_or("SD_URL", "https://api-inference.huggingface.co"),
                sd_model_id: load_env_or("SD_MODEL_ID", "runwayml/stable-diffusion-v1-5"),
                sd_api_key: load_env_optional("SD_API_KEY"),
                inference_steps: parse_env_or("SD_INFERENCE_STEPS", 30)?,
                guidance_scale: parse_env_or("SD_GUIDANCE_SCALE", 7.5)?,
                style_prefix: load_env_or("IMAGE_STYLE_PREFIX", DEFAULT_STYLE_PREFIX),
                base_seed: parse_env_or("IMAGE_BASE_SEED", 42)?,
                image_max_concurrency: parse_env_or::<usize>("IMAGE_MAX_CONCURRENCY", 1)?.max(1),
                join_policy: parse_env_or("SYNTHESIS_JOIN_POLICY", JoinPolicy::FailFast)?,
                work_dir: load_env_or("MEDIA_WORK_DIR", "backend/tmp/media").into(),
                output_dir: load_env_or("VIDEO_OUTPUT_DIR", "backend/output").into(),
                ffmpeg_bin: load_env_or("FFMPEG_BIN", "ffmpeg"),
                ffprobe_bin: load_env_or("FFPROBE_BIN", "ffprobe"),
            },
            sample_pdf_path: load_env_or("SAMPLE_PDF_PATH", "sample.pdf").into(),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| parse_value("SERVER_PORT", value))
                .transpose()?,
            http_timeout_secs: parse_env_or("HTTP_TIMEOUT_SECS", 300)?,
            cors_allow_origin: load_env_or("CORS_ALLOW_ORIGIN", "http://localhost:3000"),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => parse_value(key, value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "groq" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding.provider,
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}
