//! Core traits for ragmem abstractions.
//!
//! Storage, providers, retrieval, and caching all sit behind these traits so
//! that backends are chosen once at startup and injected as `Arc<dyn Trait>`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::*;
use crate::Result;

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for uploaded documents. Every read is scoped to its owner.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a document in `processing` status.
    async fn insert(&self, doc: &NewDocument) -> Result<Document>;

    /// Fetch a document owned by `user_id`.
    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Document>>;

    /// Find a user's document by content hash.
    async fn find_by_hash(&self, user_id: Uuid, file_hash: &str) -> Result<Option<Document>>;

    /// List a user's documents, newest first.
    async fn list(
        &self,
        user_id: Uuid,
        status: Option<DocumentStatus>,
        limit: usize,
    ) -> Result<Vec<Document>>;

    /// Record a successful ingestion.
    async fn mark_completed(
        &self,
        id: Uuid,
        chunk_count: i32,
        total_chars: i64,
        summary: &str,
    ) -> Result<()>;

    /// Record a failed ingestion with its error message.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Move a `failed` document back to `processing`, pointing it at
    /// `file_path` and clearing its previous outcome.
    ///
    /// `None` when the document is missing, not owned, or not failed.
    async fn reset_failed(&self, id: Uuid, user_id: Uuid, file_path: &str)
        -> Result<Option<Document>>;

    /// Delete a document and its chunks. Returns false if not found or not owned.
    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Aggregate totals for a user.
    async fn stats(&self, user_id: Uuid) -> Result<DocumentStats>;
}

/// Repository for indexed chunks.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Insert a batch atomically. `embeddings`, when given, pairs 1:1 with `chunks`.
    async fn insert_batch(
        &self,
        chunks: &[NewChunk],
        embeddings: Option<&[Vector]>,
    ) -> Result<Vec<Uuid>>;

    /// Cosine-similarity search over a user's embedded chunks.
    ///
    /// Hits scoring below `min_score` are dropped. Ordered by score, then recency.
    async fn find_similar(
        &self,
        user_id: Uuid,
        query: &Vector,
        document_ids: Option<&[Uuid]>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Chunks of a user whose content contains any of `tokens` (case-insensitive).
    async fn find_containing(
        &self,
        user_id: Uuid,
        tokens: &[String],
        document_ids: Option<&[Uuid]>,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>>;

    /// Remove every chunk of a document, returning how many were removed.
    async fn delete_for_document(&self, document_id: Uuid) -> Result<u64>;
}

/// Repository for long-term memories.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Persist a new active memory with access_count 0.
    async fn insert(
        &self,
        user_id: Uuid,
        memory: &NewMemory,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Memory>;

    /// Select matching memories and bump their access statistics.
    ///
    /// Selection and increment must be a single atomic step so concurrent
    /// retrievals never lose an increment.
    async fn retrieve_and_touch(&self, user_id: Uuid, query: &MemoryQuery) -> Result<Vec<Memory>>;

    /// Fetch one memory and bump its access statistics.
    async fn get_and_touch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Memory>>;

    /// Fetch one memory without touching it.
    async fn fetch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Memory>>;

    /// List memories, newest first.
    async fn list(&self, user_id: Uuid, include_inactive: bool, limit: usize)
        -> Result<Vec<Memory>>;

    /// Apply a partial update. `expires_at` is written only when `Some`.
    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        update: &MemoryUpdate,
        expires_at: Option<Option<DateTime<Utc>>>,
    ) -> Result<Option<Memory>>;

    /// Set `is_active`. Returns false if not found or not owned.
    async fn set_active(&self, id: Uuid, user_id: Uuid, active: bool) -> Result<bool>;

    /// Deactivate active memories that expired before `now`.
    async fn deactivate_expired(&self, user_id: Option<Uuid>, now: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns one vector per input text. Empty input yields an empty vec.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for chat completion.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Complete an ordered message list at the given temperature.
    async fn complete(&self, messages: &[ConversationTurn], temperature: f32) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and generation.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// RETRIEVAL TRAITS
// =============================================================================

/// Chunk index with interchangeable vector and keyword implementations.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Index a batch of chunks, returning their ids in input order.
    async fn index(&self, chunks: &[NewChunk]) -> Result<Vec<Uuid>>;

    /// Ranked search restricted to the request's user and optional documents.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>>;

    /// Remove all chunks of a document.
    async fn delete_by_document(&self, document_id: Uuid) -> Result<u64>;

    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;
}

// =============================================================================
// CACHE TRAITS
// =============================================================================

/// String key-value cache with TTL and prefix invalidation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    fn name(&self) -> &'static str;
}

// =============================================================================
// EXTRACTION TRAITS
// =============================================================================

/// Converts one family of file formats into plain text.
///
/// Adapters are registered in an `ExtractionRegistry` and dispatched on the
/// file extension.
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// Lowercased extensions this adapter handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Extract text from raw file data.
    async fn extract(&self, data: &[u8], file_name: &str) -> Result<String>;

    /// Check if the adapter's external dependencies are available.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this adapter.
    fn name(&self) -> &str;
}

/// Document text extraction as seen by the ingestion pipeline.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Fails with `UnsupportedFormat` for unknown types and `Parse` for corrupt files.
    async fn extract(&self, file_path: &Path, file_type: &str) -> Result<String>;
}
