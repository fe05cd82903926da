//! Data types and error definitions for ingestion and answering.

use crate::{embedding::EmbeddingClientError, llm::LanguageModelError, qdrant::QdrantError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The requested document does not exist.
    #[error("{} not found", .0.display())]
    MissingSource(PathBuf),
    /// Text could not be extracted from the document.
    #[error("Failed to extract text from {}: {message}", path.display())]
    Extraction {
        /// Document being read.
        path: PathBuf,
        /// Extractor diagnostic.
        message: String,
    },
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant rejected a write or collection request.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Background extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Errors emitted while answering a question.
#[derive(Debug, Error)]
pub enum AskError {
    /// Question was blank.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// Embedding provider failed to return a vector for the question.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the question")]
    EmptyEmbedding,
    /// Qdrant search failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Language model failed to produce an answer.
    #[error("Answer generation failed: {0}")]
    Generation(#[from] LanguageModelError),
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Pages that yielded text.
    pub pages: usize,
    /// Chunks written to the vector store.
    pub chunks_uploaded: usize,
    /// Chunks skipped because an identical chunk was already part of the document.
    pub skipped_duplicates: usize,
}

/// Answer returned to API consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Generated (or fallback) answer text.
    pub answer: String,
    /// Previews of the retrieved chunks; absent when nothing was retrieved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}
