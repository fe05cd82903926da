#![deny(missing_docs)]

//! Core library for the Auto-Didact backend: PDF knowledge base, grounded answers and
//! narrated explainer videos.

/// HTTP routing and REST handlers.
pub mod api;
/// Service construction from configuration.
pub mod bootstrap;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF ingestion and retrieval-augmented answers.
pub mod knowledge;
/// Language-model client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Service activity counters.
pub mod metrics;
/// Qdrant vector store integration.
pub mod qdrant;
/// Script-to-video pipeline.
pub mod video;
