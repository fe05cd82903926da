use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing service activity since startup.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    videos_generated: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks stored for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished video.
    pub fn record_video(&self) {
        self.videos_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            videos_generated: self.videos_generated.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup.
    pub documents_ingested: u64,
    /// Chunks written to the vector store across all documents.
    pub chunks_indexed: u64,
    /// Questions answered from retrieved context.
    pub questions_answered: u64,
    /// Videos rendered to completion.
    pub videos_generated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = ServiceMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
    }

    #[test]
    fn answers_and_videos_are_counted_independently() {
        let metrics = ServiceMetrics::new();
        metrics.record_answer();
        metrics.record_video();
        metrics.record_video();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 1);
        assert_eq!(snapshot.videos_generated, 2);
        assert_eq!(snapshot.documents_ingested, 0);
    }
}
