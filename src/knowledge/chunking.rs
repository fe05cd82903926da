//! Token-budgeted text splitting.
//!
//! Documents are split with `semchunk-rs`, which prefers paragraph, sentence and word boundaries,
//! using a `tiktoken-rs` counter resolved from the embedding model name (falling back to
//! `cl100k_base`, then to whitespace counting). After splitting, each chunk is prefixed with the
//! tail of its predecessor so that sentences straddling a boundary stay retrievable.

use super::types::ChunkingError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base};

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Reusable splitter holding the token budget and counter.
pub(crate) struct Splitter {
    chunk_size: usize,
    overlap: usize,
    counter: TokenCounter,
}

impl Splitter {
    /// Build a splitter whose token counter matches `model` as closely as possible.
    pub(crate) fn for_model(
        model: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self, ChunkingError> {
        Self::with_counter(chunk_size, overlap, token_counter_for(model))
    }

    pub(crate) fn with_counter(
        chunk_size: usize,
        overlap: usize,
        counter: TokenCounter,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            counter,
        })
    }

    /// Split `text` into chunks of at most `chunk_size` tokens, overlap included.
    ///
    /// Returns an empty vector for whitespace-only input.
    pub(crate) fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let counter = self.counter.clone();
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        let chunks = chunker.chunk(text);
        if self.overlap == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut overlapped = Vec::with_capacity(chunks.len());
        overlapped.push(chunks[0].clone());
        for pair in chunks.windows(2) {
            overlapped.push(self.with_overlap(&pair[0], &pair[1]));
        }
        overlapped
    }

    fn count(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    fn with_overlap(&self, previous: &str, current: &str) -> String {
        let tail = self.suffix_within(previous, self.overlap);
        if tail.is_empty() {
            return current.to_string();
        }
        let current = current.trim_start();
        let combined = format!("{tail} {current}");
        let fitted = self.suffix_within(&combined, self.chunk_size);
        if fitted.len() < current.len() {
            return current.to_string();
        }
        fitted.to_string()
    }

    /// Longest word-aligned suffix of `text` that fits in `budget` tokens.
    fn suffix_within<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        let mut best = "";
        for start in word_starts(text).into_iter().rev() {
            let candidate = &text[start..];
            if self.count(candidate) > budget {
                break;
            }
            best = candidate;
        }
        best
    }
}

fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut previous_is_space = true;
    for (idx, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        if previous_is_space && !is_space {
            starts.push(idx);
        }
        previous_is_space = is_space;
    }
    starts
}

/// Resolve a token counter for `model`, degrading to whitespace counting.
pub(crate) fn token_counter_for(model: &str) -> TokenCounter {
    match resolve_encoding(model.trim()) {
        Some(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        None => {
            tracing::warn!(model, "Tokenizer unavailable; falling back to whitespace counter");
            whitespace_counter()
        }
    }
}

fn resolve_encoding(model: &str) -> Option<CoreBPE> {
    if let Ok(encoding) = get_bpe_from_model(model) {
        return Some(encoding);
    }
    let by_name = match model {
        "o200k_base" => o200k_base(),
        "p50k_base" => p50k_base(),
        "r50k_base" | "gpt2" => r50k_base(),
        _ => {
            tracing::debug!(model, "Unknown tokenizer model; using 'cl100k_base'");
            cl100k_base()
        }
    };
    by_name.ok()
}

pub(crate) fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, overlap: usize) -> Splitter {
        Splitter::with_counter(chunk_size, overlap, whitespace_counter()).expect("splitter")
    }

    #[test]
    fn split_respects_chunk_size() {
        let chunks = splitter(2, 0).split("one two three four five");
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn split_handles_blank_input() {
        assert!(splitter(4, 1).split("   \n ").is_empty());
    }

    #[test]
    fn overlap_carries_tail_of_previous_chunk() {
        let counter = whitespace_counter();
        let chunks = splitter(3, 1).split("one two three four five");
        assert_eq!(chunks, vec!["one two three", "three four five"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 3);
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = Splitter::with_counter(0, 0, whitespace_counter())
            .err()
            .expect("invalid size");
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunks = splitter(2, 10).split("alpha beta gamma delta");
        for chunk in &chunks {
            assert!(chunk.split_whitespace().count() <= 2);
        }
    }

    #[test]
    fn tiktoken_budget_preserves_words() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let splitter = Splitter::for_model("text-embedding-3-small", 5, 0).expect("splitter");
        let chunks = splitter.split(text);
        for chunk in &chunks {
            assert!(splitter.count(chunk) <= 5);
        }
        let words: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(words, text.split_whitespace().collect::<Vec<_>>());
    }
}
