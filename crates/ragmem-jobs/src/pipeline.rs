//! Single-document ingestion: extract, chunk, index, record the outcome.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};

use ragmem_core::{
    summarize, Document, DocumentRepository, Error, NewChunk, Result, RetrievalIndex,
    TextExtractor,
};
use ragmem_db::chunking::Chunker;

/// What a successful ingestion produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub chunk_count: usize,
    pub total_chars: usize,
}

/// Turns a registered document into indexed chunks.
pub struct IngestionPipeline {
    documents: Arc<dyn DocumentRepository>,
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    index: Arc<dyn RetrievalIndex>,
}

impl IngestionPipeline {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        extractor: Arc<dyn TextExtractor>,
        chunker: Arc<dyn Chunker>,
        index: Arc<dyn RetrievalIndex>,
    ) -> Self {
        Self {
            documents,
            extractor,
            chunker,
            index,
        }
    }

    /// Ingest `document` and move it to `completed` or `failed`.
    ///
    /// The error is returned after the failure has been recorded. There is no
    /// retry.
    #[instrument(skip(self, document), fields(
        subsystem = "jobs",
        component = "ingestion",
        op = "process",
        document_id = %document.id,
        file_type = %document.file_type,
    ))]
    pub async fn process(&self, document: &Document) -> Result<IngestOutcome> {
        let start = Instant::now();
        match self.run(document).await {
            Ok(outcome) => {
                info!(
                    chunk_count = outcome.chunk_count,
                    total_chars = outcome.total_chars,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Document ingested"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Document ingestion failed"
                );
                if let Err(mark_err) = self.documents.mark_failed(document.id, &e.to_string()).await {
                    error!(error = %mark_err, "Failed to record ingestion failure");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, document: &Document) -> Result<IngestOutcome> {
        let text = self
            .extractor
            .extract(Path::new(&document.file_path), &document.file_type)
            .await?;
        if text.trim().is_empty() {
            return Err(Error::IndexInconsistency(
                "document has no extractable text".to_string(),
            ));
        }

        let chunks: Vec<NewChunk> = self
            .chunker
            .chunk(&text)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| NewChunk {
                document_id: document.id,
                user_id: document.user_id,
                chunk_index: i as i32,
                content: chunk.text,
                title: document.file_name.clone(),
            })
            .collect();
        if chunks.is_empty() {
            return Err(Error::IndexInconsistency(
                "chunking produced no chunks".to_string(),
            ));
        }

        let ids = self.index.index(&chunks).await?;
        if ids.len() != chunks.len() {
            return Err(Error::IndexInconsistency(format!(
                "indexed {} of {} chunks",
                ids.len(),
                chunks.len()
            )));
        }

        let total_chars = text.chars().count();
        self.documents
            .mark_completed(
                document.id,
                chunks.len() as i32,
                total_chars as i64,
                &summarize(&text),
            )
            .await?;

        Ok(IngestOutcome {
            chunk_count: chunks.len(),
            total_chars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionRegistry;
    use ragmem_core::{DocumentStatus, NewDocument, SearchRequest};
    use ragmem_db::chunking::{ChunkerConfig, TextChunker};
    use ragmem_db::InMemoryStore;
    use ragmem_inference::MockInferenceBackend;
    use ragmem_search::{KeywordIndex, VectorIndex};
    use std::io::Write;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<InMemoryStore>,
        pipeline: IngestionPipeline,
        _dir: tempfile::TempDir,
        dir_path: std::path::PathBuf,
    }

    fn fixture(index: Arc<dyn RetrievalIndex>, store: Arc<InMemoryStore>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        let pipeline = IngestionPipeline::new(
            store.clone(),
            Arc::new(ExtractionRegistry::with_defaults()),
            Arc::new(TextChunker::new(ChunkerConfig::new(512, 50))),
            index,
        );
        Fixture {
            store,
            pipeline,
            _dir: dir,
            dir_path,
        }
    }

    async fn register(fx: &Fixture, user: Uuid, file_name: &str, body: &[u8]) -> Document {
        let path = fx.dir_path.join(file_name);
        std::fs::File::create(&path).unwrap().write_all(body).unwrap();
        let new = NewDocument::from_file_name(
            user,
            file_name,
            path.to_string_lossy(),
            body.len() as i64,
            format!("hash-{}", file_name),
        );
        DocumentRepository::insert(fx.store.as_ref(), &new).await.unwrap()
    }

    #[tokio::test]
    async fn test_text_document_completes() {
        let store = Arc::new(InMemoryStore::new());
        let fx = fixture(Arc::new(KeywordIndex::new(store.clone())), store.clone());
        let user = Uuid::now_v7();
        let body = "Annual leave is fifteen days per year.\n".repeat(40);
        let doc = register(&fx, user, "handbook.txt", body.as_bytes()).await;

        let outcome = fx.pipeline.process(&doc).await.unwrap();
        assert!(outcome.chunk_count > 1);
        assert_eq!(outcome.total_chars, body.chars().count());
        assert_eq!(fx.store.chunk_count().await, outcome.chunk_count);

        let stored = fx.store.get(doc.id, user).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.chunk_count as usize, outcome.chunk_count);
        assert!(stored.summary.unwrap().ends_with("..."));
        assert!(stored.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_chunks_carry_file_name_and_are_searchable() {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(KeywordIndex::new(store.clone()));
        let fx = fixture(index.clone(), store);
        let user = Uuid::now_v7();
        let doc = register(&fx, user, "policy.md", "Remote work needs manager approval.".as_bytes()).await;

        fx.pipeline.process(&doc).await.unwrap();
        let hits = index
            .search(&SearchRequest::new("remote approval", user))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "policy.md");
        assert_eq!(hits[0].document_id, doc.id);
    }

    #[tokio::test]
    async fn test_whitespace_only_text_fails() {
        let store = Arc::new(InMemoryStore::new());
        let fx = fixture(Arc::new(KeywordIndex::new(store.clone())), store.clone());
        let user = Uuid::now_v7();
        let doc = register(&fx, user, "blank.txt", b" \n\n\t ").await;

        let err = fx.pipeline.process(&doc).await.unwrap_err();
        assert!(matches!(err, Error::IndexInconsistency(_)));

        let stored = fx.store.get(doc.id, user).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(
            stored.error_message.as_deref(),
            Some("Index inconsistency: document has no extractable text")
        );
    }

    #[tokio::test]
    async fn test_unsupported_format_fails() {
        let store = Arc::new(InMemoryStore::new());
        let fx = fixture(Arc::new(KeywordIndex::new(store.clone())), store.clone());
        let user = Uuid::now_v7();
        let doc = register(&fx, user, "slides.pptx", b"PK\x03\x04").await;

        let err = fx.pipeline.process(&doc).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        let stored = fx.store.get(doc.id, user).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.error_message.unwrap().contains("pptx"));
    }

    #[tokio::test]
    async fn test_embedding_failure_marks_failed() {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(VectorIndex::new(
            store.clone(),
            Arc::new(MockInferenceBackend::new().failing()),
        ));
        let fx = fixture(index, store.clone());
        let user = Uuid::now_v7();
        let doc = register(&fx, user, "notes.txt", "Quarterly planning notes.".as_bytes()).await;

        let err = fx.pipeline.process(&doc).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(store.chunk_count().await, 0);
        let stored = fx.store.get(doc.id, user).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
    }
}
