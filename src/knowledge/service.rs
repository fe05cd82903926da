//! Knowledge service coordinating PDF ingestion and grounded answers.

use crate::{
    embedding::EmbeddingClient,
    knowledge::{
        answer::{NO_CONTEXT_ANSWER, build_answer_prompt, source_preview},
        chunking::Splitter,
        mappers::{dedupe_chunks, hit_text},
        pdf::{PdfPage, extract_pages},
        types::{Answer, AskError, IngestError, IngestOutcome},
    },
    llm::{CompletionRequest, LanguageModel},
    metrics::ServiceMetrics,
    qdrant::{PointInsert, QdrantService},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EMBEDDING_BATCH_SIZE: usize = 64;

/// Static settings for the knowledge service.
#[derive(Debug, Clone)]
pub struct KnowledgeSettings {
    /// Collection receiving document chunks.
    pub collection: String,
    /// Vector size used when the collection has to be created.
    pub vector_size: u64,
    /// Neighbours retrieved per question.
    pub top_k: usize,
    /// Document ingested by [`KnowledgeApi::ingest_sample`].
    pub sample_pdf_path: PathBuf,
}

/// Abstraction over the knowledge pipeline used by the HTTP surface.
#[async_trait]
pub trait KnowledgeApi: Send + Sync {
    /// Ingest the configured sample document.
    async fn ingest_sample(&self) -> Result<IngestOutcome, IngestError>;

    /// Answer `question` from the indexed documents.
    async fn answer(&self, question: &str) -> Result<Answer, AskError>;
}

/// Owns the long-lived embedding, Qdrant and language-model handles.
///
/// Construct once at startup and share through an `Arc`.
pub struct KnowledgeService {
    embedding: Box<dyn EmbeddingClient>,
    qdrant: QdrantService,
    llm: Arc<dyn LanguageModel>,
    splitter: Splitter,
    settings: KnowledgeSettings,
    metrics: Arc<ServiceMetrics>,
}

impl KnowledgeService {
    pub(crate) fn new(
        embedding: Box<dyn EmbeddingClient>,
        qdrant: QdrantService,
        llm: Arc<dyn LanguageModel>,
        splitter: Splitter,
        settings: KnowledgeSettings,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            embedding,
            qdrant,
            llm,
            splitter,
            settings,
            metrics,
        }
    }

    /// Extract, chunk, embed and index the PDF at `path`.
    pub async fn ingest_pdf(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        tracing::info!(path = %path.display(), "Ingesting PDF");
        let pages = extract_pages(path).await?;
        self.ingest_pages(&path.display().to_string(), pages).await
    }

    /// Chunk, embed and index already-extracted pages attributed to `source`.
    pub async fn ingest_pages(
        &self,
        source: &str,
        pages: Vec<PdfPage>,
    ) -> Result<IngestOutcome, IngestError> {
        self.qdrant
            .create_collection_if_not_exists(&self.settings.collection, self.settings.vector_size)
            .await?;

        let page_count = pages.len();
        let chunks = pages.iter().flat_map(|page| {
            self.splitter
                .split(&page.text)
                .into_iter()
                .map(move |chunk| (page.number, chunk))
        });
        let (prepared, skipped_duplicates) = dedupe_chunks(chunks);

        let mut points = Vec::with_capacity(prepared.len());
        for batch in prepared.chunks(EMBEDDING_BATCH_SIZE) {
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedding.generate_embeddings(texts).await?;
            points.extend(batch.iter().zip(vectors).map(|(chunk, vector)| PointInsert {
                text: chunk.text.clone(),
                chunk_hash: chunk.chunk_hash.clone(),
                source: source.to_string(),
                page: chunk.page,
                vector,
            }));
        }

        let chunks_uploaded = self
            .qdrant
            .index_points(&self.settings.collection, points)
            .await?;
        self.metrics.record_document(chunks_uploaded as u64);
        tracing::info!(
            source,
            pages = page_count,
            chunks = chunks_uploaded,
            skipped_duplicates,
            "Document indexed"
        );

        Ok(IngestOutcome {
            pages: page_count,
            chunks_uploaded,
            skipped_duplicates,
        })
    }

    /// Retrieve the nearest chunks for `question` and answer from them.
    pub async fn answer(&self, question: &str) -> Result<Answer, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuestion);
        }
        tracing::info!(question, "Searching for context");

        let vector = self
            .embedding
            .generate_embeddings(vec![question.to_string()])
            .await?
            .pop()
            .ok_or(AskError::EmptyEmbedding)?;
        let hits = self
            .qdrant
            .search_points(&self.settings.collection, vector, self.settings.top_k)
            .await?;
        let texts: Vec<&str> = hits.iter().filter_map(hit_text).collect();

        if texts.is_empty() {
            tracing::info!("No context retrieved; skipping generation");
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: None,
            });
        }

        let context = texts.join("\n\n");
        let answer = self
            .llm
            .complete(CompletionRequest::text(build_answer_prompt(question, &context)))
            .await?;
        self.metrics.record_answer();
        tracing::debug!(hits = texts.len(), "Answer generated");

        Ok(Answer {
            answer,
            sources: Some(texts.iter().map(|text| source_preview(text)).collect()),
        })
    }
}

#[async_trait]
impl KnowledgeApi for KnowledgeService {
    async fn ingest_sample(&self) -> Result<IngestOutcome, IngestError> {
        let path = self.settings.sample_pdf_path.clone();
        self.ingest_pdf(&path).await
    }

    async fn answer(&self, question: &str) -> Result<Answer, AskError> {
        KnowledgeService::answer(self, question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::knowledge::chunking::whitespace_counter;
    use crate::llm::LanguageModelError;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };
    use reqwest::Client;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<String, LanguageModelError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(request.prompt);
            Ok("100°C at sea level.".into())
        }
    }

    fn service(server: &MockServer, llm: Arc<RecordingModel>) -> KnowledgeService {
        KnowledgeService::new(
            Box::new(HashEmbeddingClient::new(8)),
            QdrantService::new(Client::new(), &server.base_url(), None).expect("qdrant"),
            llm,
            Splitter::with_counter(4, 0, whitespace_counter()).expect("splitter"),
            KnowledgeSettings {
                collection: "documents".into(),
                vector_size: 8,
                top_k: 3,
                sample_pdf_path: "missing-sample.pdf".into(),
            },
            Arc::new(ServiceMetrics::new()),
        )
    }

    #[tokio::test]
    async fn answer_uses_retrieved_context_and_previews_sources() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/documents/points/query")
                    .json_body_partial(r#"{"limit":3}"#);
                then.status(200).json_body(json!({
                    "result": { "points": [
                        { "id": 1, "score": 0.9, "payload": { "text": "Water boils at 100°C at sea level." } },
                        { "id": 2, "score": 0.7, "payload": { "text": "Altitude lowers the boiling point." } }
                    ]}
                }));
            })
            .await;
        let llm = Arc::new(RecordingModel::default());

        let answer = service(&server, llm.clone())
            .answer("When does water boil?")
            .await
            .expect("answer");

        assert_eq!(answer.answer, "100°C at sea level.");
        assert_eq!(
            answer.sources,
            Some(vec![
                "Water boils at 100°C at sea level....".to_string(),
                "Altitude lowers the boiling point....".to_string(),
            ])
        );
        let prompts = llm.prompts.lock().expect("prompts lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(
            "Water boils at 100°C at sea level.\n\nAltitude lowers the boiling point."
        ));
    }

    #[tokio::test]
    async fn answer_without_hits_skips_the_model() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/documents/points/query");
                then.status(200).json_body(json!({ "result": [] }));
            })
            .await;
        let llm = Arc::new(RecordingModel::default());

        let answer = service(&server, llm.clone())
            .answer("Anything?")
            .await
            .expect("answer");

        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(answer.sources.is_none());
        assert!(llm.prompts.lock().expect("prompts lock").is_empty());
    }

    #[tokio::test]
    async fn ingest_pages_chunks_dedupes_and_indexes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/documents");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/documents/points");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let pages = vec![
            PdfPage {
                number: 1,
                text: "Water boils at 100°C.".into(),
            },
            PdfPage {
                number: 2,
                text: "Water boils at 100°C.".into(),
            },
        ];
        let outcome = service(&server, Arc::new(RecordingModel::default()))
            .ingest_pages("sample.pdf", pages)
            .await
            .expect("ingest");

        upsert.assert_async().await;
        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.chunks_uploaded, 1);
        assert_eq!(outcome.skipped_duplicates, 1);
    }

    #[tokio::test]
    async fn ingest_sample_reports_missing_file() {
        let server = MockServer::start_async().await;
        let error = service(&server, Arc::new(RecordingModel::default()))
            .ingest_sample()
            .await
            .expect_err("missing sample");
        assert!(matches!(error, IngestError::MissingSource(_)));
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let server = MockServer::start_async().await;
        let error = service(&server, Arc::new(RecordingModel::default()))
            .answer("   ")
            .await
            .expect_err("blank");
        assert!(matches!(error, AskError::EmptyQuestion));
    }
}
