//! Embedding-backed retrieval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use ragmem_core::defaults::{RETRIEVAL_TIMEOUT_SECS, SIMILARITY_THRESHOLD, TOP_K_MAX};
use ragmem_core::{
    ChunkRepository, EmbeddingBackend, Error, NewChunk, Result, RetrievalIndex, SearchRequest,
    SearchResult,
};
use ragmem_inference::{embed_or_sentinel, is_sentinel};

/// Cosine-similarity index over chunk embeddings.
///
/// Indexing fails loudly when the provider fails; searching degrades to an
/// empty result instead.
pub struct VectorIndex {
    chunks: Arc<dyn ChunkRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    threshold: f32,
    timeout: Duration,
}

impl VectorIndex {
    pub fn new(chunks: Arc<dyn ChunkRepository>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            chunks,
            embedder,
            threshold: SIMILARITY_THRESHOLD,
            timeout: Duration::from_secs(RETRIEVAL_TIMEOUT_SECS),
        }
    }

    /// Minimum cosine similarity for a hit.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Timeout for embedding the query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[async_trait]
impl RetrievalIndex for VectorIndex {
    #[instrument(skip(self, chunks), fields(
        subsystem = "search",
        component = "vector_index",
        op = "index",
        chunk_count = chunks.len(),
    ))]
    async fn index(&self, chunks: &[NewChunk]) -> Result<Vec<Uuid>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

        let vectors = self.embedder.embed_texts(&texts).await.map_err(|e| match e {
            Error::Embedding(_) => e,
            other => Error::Embedding(other.to_string()),
        })?;

        if vectors.len() != chunks.len() {
            return Err(Error::IndexInconsistency(format!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if vectors.iter().any(is_sentinel) {
            return Err(Error::Embedding(
                "embedding provider returned a zero vector".to_string(),
            ));
        }

        let ids = self.chunks.insert_batch(chunks, Some(&vectors)).await?;
        debug!(
            result_count = ids.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chunks embedded and stored"
        );
        Ok(ids)
    }

    #[instrument(skip(self, request), fields(
        subsystem = "search",
        component = "vector_index",
        op = "search",
        user_id = %request.user_id,
        top_k = request.top_k,
    ))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let top_k = request.top_k.min(TOP_K_MAX);
        if request.query.trim().is_empty() || top_k == 0 {
            return Ok(vec![]);
        }
        if matches!(&request.document_ids, Some(ids) if ids.is_empty()) {
            return Ok(vec![]);
        }
        let start = Instant::now();

        let query_vector = embed_or_sentinel(
            self.embedder.as_ref(),
            std::slice::from_ref(&request.query),
            self.timeout,
        )
        .await
        .into_iter()
        .next();
        let Some(query_vector) = query_vector.filter(|v| !is_sentinel(v)) else {
            warn!("Query embedding unavailable, returning no results");
            return Ok(vec![]);
        };

        let results = self
            .chunks
            .find_similar(
                request.user_id,
                &query_vector,
                request.document_ids.as_deref(),
                top_k,
                self.threshold,
            )
            .await?;

        debug!(
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Vector search complete"
        );
        Ok(results)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<u64> {
        self.chunks.delete_for_document(document_id).await
    }

    fn backend_name(&self) -> &'static str {
        "vector"
    }
}
