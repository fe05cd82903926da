//! Mapping helpers between chunks, Qdrant points and answer sources.

use crate::qdrant::{ScoredPoint, compute_chunk_hash};
use serde_json::Value;
use std::collections::HashSet;

/// Chunk text with its page and hash, ready for embedding.
#[derive(Debug, Clone)]
pub(crate) struct PreparedChunk {
    pub(crate) text: String,
    pub(crate) page: usize,
    pub(crate) chunk_hash: String,
}

/// Remove duplicate and blank chunks, keeping the first occurrence of each.
pub(crate) fn dedupe_chunks(
    chunks: impl IntoIterator<Item = (usize, String)>,
) -> (Vec<PreparedChunk>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for (page, text) in chunks {
        if text.trim().is_empty() {
            continue;
        }
        let chunk_hash = compute_chunk_hash(&text);
        if seen.insert(chunk_hash.clone()) {
            prepared.push(PreparedChunk {
                text,
                page,
                chunk_hash,
            });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

/// Extract the stored chunk text from a search hit.
pub(crate) fn hit_text(point: &ScoredPoint) -> Option<&str> {
    match point.payload.as_ref()?.get("text") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let (prepared, skipped) = dedupe_chunks(vec![
            (1, "alpha".to_string()),
            (1, "  ".to_string()),
            (2, "alpha".to_string()),
            (2, "beta".to_string()),
        ]);
        assert_eq!(skipped, 1);
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[0].page, 1);
        assert_eq!(prepared[1].text, "beta");
    }

    #[test]
    fn hit_text_ignores_missing_or_blank_payloads() {
        let mut payload = Map::new();
        payload.insert("text".into(), json!("Water boils."));
        let with_text = ScoredPoint {
            id: "1".into(),
            score: 0.9,
            payload: Some(payload),
        };
        let without = ScoredPoint {
            id: "2".into(),
            score: 0.8,
            payload: None,
        };
        assert_eq!(hit_text(&with_text), Some("Water boils."));
        assert_eq!(hit_text(&without), None);
    }
}
