//! Request, response and error types for the Qdrant REST API.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failures talking to Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// `QDRANT_URL` could not be parsed.
    #[error("invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// Transport or body decoding failed.
    #[error("Qdrant transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant answered with a non-success status.
    #[error("Qdrant returned {status}: {body}")]
    UnexpectedStatus {
        /// Status code of the response.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },
}

/// Embedded chunk waiting to be written.
#[derive(Debug, Clone)]
pub struct PointInsert {
    /// Chunk text, stored in the payload for retrieval.
    pub text: String,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
    /// Document the chunk came from.
    pub source: String,
    /// One-based page number in `source`.
    pub page: usize,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// Nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Point id rendered as a string (UUID or integer).
    pub id: String,
    /// Similarity to the query vector.
    pub score: f32,
    /// Stored payload, when requested.
    pub payload: Option<Map<String, Value>>,
}

/// Body of `POST /collections/{name}/points/query`.
#[derive(Deserialize)]
pub(crate) struct SearchEnvelope {
    pub(crate) result: SearchResult,
}

/// Older servers return a bare list; current ones wrap it in `{"points": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum SearchResult {
    Flat(Vec<SearchHit>),
    Wrapped {
        #[serde(default)]
        points: Vec<SearchHit>,
    },
}

impl SearchResult {
    pub(crate) fn into_points(self) -> Vec<ScoredPoint> {
        let hits = match self {
            Self::Flat(hits) | Self::Wrapped { points: hits } => hits,
        };
        hits.into_iter().map(ScoredPoint::from).collect()
    }
}

#[derive(Deserialize)]
pub(crate) struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl From<SearchHit> for ScoredPoint {
    fn from(hit: SearchHit) -> Self {
        let id = match hit.id {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Self {
            id,
            score: hit.score,
            payload: hit.payload,
        }
    }
}
