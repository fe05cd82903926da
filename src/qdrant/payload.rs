//! Helpers for constructing and hashing Qdrant payloads.

use crate::qdrant::types::PointInsert;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload stored alongside each indexed chunk.
pub(crate) fn build_payload(point: &PointInsert, timestamp_rfc3339: &str) -> Value {
    json!({
        "text": point.text,
        "source": point.source,
        "page": point.page,
        "chunk_hash": point.chunk_hash,
        "timestamp": timestamp_rfc3339,
    })
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier suitable for a Qdrant point.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
