//! Document knowledge base: PDF ingestion into Qdrant and retrieval-augmented answers.

mod answer;
pub(crate) mod chunking;
mod mappers;
pub mod pdf;
mod service;
pub mod types;

pub use answer::NO_CONTEXT_ANSWER;
pub use pdf::{PdfPage, discover_pdfs, extract_pages};
pub use service::{KnowledgeApi, KnowledgeService, KnowledgeSettings};
pub use types::{Answer, AskError, ChunkingError, IngestError, IngestOutcome};
