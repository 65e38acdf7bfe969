//! Process-local store implementing every repository trait.
//!
//! Used when no `DATABASE_URL` is configured and throughout the test suites.
//! All state sits behind one async mutex, so each trait method is atomic with
//! respect to the others, including memory retrieval and its access bump.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use ragmem_core::{
    ChunkRepository, Document, DocumentChunk, DocumentRepository, DocumentStats, DocumentStatus,
    Error, Memory, MemoryQuery, MemoryRepository, MemoryUpdate, NewChunk, NewDocument, NewMemory,
    Result, SearchResult, Vector,
};

struct StoredChunk {
    chunk: DocumentChunk,
    embedding: Option<Vector>,
    seq: u64,
}

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    chunks: Vec<StoredChunk>,
    /// Kept in insertion order.
    memories: Vec<Memory>,
    next_seq: u64,
}

/// In-memory implementation of the document, chunk, and memory repositories.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks across all users.
    pub async fn chunk_count(&self) -> usize {
        self.state.lock().await.chunks.len()
    }
}

/// Cosine similarity in [-1, 1]; 0 when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn in_scope(document_id: Uuid, document_ids: Option<&[Uuid]>) -> bool {
    document_ids.map_or(true, |ids| ids.contains(&document_id))
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn insert(&self, doc: &NewDocument) -> Result<Document> {
        let mut state = self.state.lock().await;
        if state
            .documents
            .values()
            .any(|d| d.user_id == doc.user_id && d.file_hash == doc.file_hash)
        {
            return Err(Error::InvalidInput(format!(
                "document with hash {} already exists",
                doc.file_hash
            )));
        }
        let document = Document {
            id: Uuid::now_v7(),
            user_id: doc.user_id,
            title: doc.title.clone(),
            file_name: doc.file_name.clone(),
            file_path: doc.file_path.clone(),
            file_type: doc.file_type.clone(),
            mime_type: doc.mime_type.clone(),
            file_size: doc.file_size,
            file_hash: doc.file_hash.clone(),
            status: DocumentStatus::Processing,
            error_message: None,
            chunk_count: 0,
            total_chars: 0,
            summary: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        state.documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .get(&id)
            .filter(|d| d.user_id == user_id)
            .cloned())
    }

    async fn find_by_hash(&self, user_id: Uuid, file_hash: &str) -> Result<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .values()
            .find(|d| d.user_id == user_id && d.file_hash == file_hash)
            .cloned())
    }

    async fn list(
        &self,
        user_id: Uuid,
        status: Option<DocumentStatus>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let state = self.state.lock().await;
        let mut docs: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.user_id == user_id && status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        chunk_count: i32,
        total_chars: i64,
        summary: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or(Error::DocumentNotFound(id))?;
        doc.status = DocumentStatus::Completed;
        doc.chunk_count = chunk_count;
        doc.total_chars = total_chars;
        doc.summary = Some(summary.to_string());
        doc.error_message = None;
        doc.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or(Error::DocumentNotFound(id))?;
        doc.status = DocumentStatus::Failed;
        doc.error_message = Some(error.to_string());
        doc.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn reset_failed(
        &self,
        id: Uuid,
        user_id: Uuid,
        file_path: &str,
    ) -> Result<Option<Document>> {
        let mut state = self.state.lock().await;
        let Some(doc) = state
            .documents
            .get_mut(&id)
            .filter(|d| d.user_id == user_id && d.status == DocumentStatus::Failed)
        else {
            return Ok(None);
        };
        doc.status = DocumentStatus::Processing;
        doc.file_path = file_path.to_string();
        doc.error_message = None;
        doc.chunk_count = 0;
        doc.total_chars = 0;
        doc.summary = None;
        doc.processed_at = None;
        Ok(Some(doc.clone()))
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let owned = state
            .documents
            .get(&id)
            .is_some_and(|d| d.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        state.documents.remove(&id);
        state.chunks.retain(|c| c.chunk.document_id != id);
        Ok(true)
    }

    async fn stats(&self, user_id: Uuid) -> Result<DocumentStats> {
        let state = self.state.lock().await;
        let mut stats = DocumentStats::default();
        for doc in state.documents.values().filter(|d| d.user_id == user_id) {
            stats.total_documents += 1;
            stats.total_chunks += doc.chunk_count as i64;
            stats.total_size += doc.file_size;
            match doc.status {
                DocumentStatus::Processing => stats.processing += 1,
                DocumentStatus::Completed => stats.completed += 1,
                DocumentStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

// =============================================================================
// CHUNKS
// =============================================================================

#[async_trait]
impl ChunkRepository for InMemoryStore {
    async fn insert_batch(
        &self,
        chunks: &[NewChunk],
        embeddings: Option<&[Vector]>,
    ) -> Result<Vec<Uuid>> {
        if let Some(vectors) = embeddings {
            if vectors.len() != chunks.len() {
                return Err(Error::IndexInconsistency(format!(
                    "{} chunks but {} embeddings",
                    chunks.len(),
                    vectors.len()
                )));
            }
        }

        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let id = Uuid::now_v7();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.chunks.push(StoredChunk {
                chunk: DocumentChunk {
                    id,
                    document_id: chunk.document_id,
                    user_id: chunk.user_id,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                    title: chunk.title.clone(),
                    created_at: now,
                },
                embedding: embeddings.map(|v| v[i].clone()),
                seq,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn find_similar(
        &self,
        user_id: Uuid,
        query: &Vector,
        document_ids: Option<&[Uuid]>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let state = self.state.lock().await;
        let query = query.as_slice();
        let mut scored: Vec<(f32, u64, &DocumentChunk)> = state
            .chunks
            .iter()
            .filter(|c| c.chunk.user_id == user_id && in_scope(c.chunk.document_id, document_ids))
            .filter_map(|c| {
                let embedding = c.embedding.as_ref()?;
                let score = cosine_similarity(query, embedding.as_slice());
                (score >= min_score).then_some((score, c.seq, &c.chunk))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, _, chunk)| SearchResult {
                chunk_id: chunk.id,
                document_id: chunk.document_id,
                title: chunk.title.clone(),
                content: chunk.content.clone(),
                score,
                created_at: chunk.created_at,
            })
            .collect())
    }

    async fn find_containing(
        &self,
        user_id: Uuid,
        tokens: &[String],
        document_ids: Option<&[Uuid]>,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let state = self.state.lock().await;
        // Newest first, matching the SQL ordering
        Ok(state
            .chunks
            .iter()
            .rev()
            .filter(|c| c.chunk.user_id == user_id && in_scope(c.chunk.document_id, document_ids))
            .filter(|c| {
                let content = c.chunk.content.to_lowercase();
                lowered.iter().any(|t| content.contains(t.as_str()))
            })
            .take(limit)
            .map(|c| c.chunk.clone())
            .collect())
    }

    async fn delete_for_document(&self, document_id: Uuid) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.chunks.len();
        state.chunks.retain(|c| c.chunk.document_id != document_id);
        Ok((before - state.chunks.len()) as u64)
    }
}

// =============================================================================
// MEMORIES
// =============================================================================

#[async_trait]
impl MemoryRepository for InMemoryStore {
    async fn insert(
        &self,
        user_id: Uuid,
        memory: &NewMemory,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Memory> {
        let now = Utc::now();
        let stored = Memory {
            id: Uuid::now_v7(),
            user_id,
            content: memory.content.clone(),
            importance: memory.importance,
            category: memory.category_or_default().to_string(),
            tags: memory.tags.clone(),
            source: memory.source,
            access_count: 0,
            last_accessed: None,
            expires_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.memories.push(stored.clone());
        Ok(stored)
    }

    async fn retrieve_and_touch(&self, user_id: Uuid, query: &MemoryQuery) -> Result<Vec<Memory>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let mut picked: Vec<usize> = state
            .memories
            .iter()
            .enumerate()
            .filter(|(_, m)| m.user_id == user_id && query.matches(m))
            .map(|(i, _)| i)
            .collect();
        // Stable sort keeps insertion order among equal importance
        picked.sort_by(|&a, &b| {
            state.memories[b]
                .importance
                .total_cmp(&state.memories[a].importance)
        });
        picked.truncate(query.limit);

        let mut out = Vec::with_capacity(picked.len());
        for i in picked {
            let memory = &mut state.memories[i];
            memory.access_count += 1;
            memory.last_accessed = Some(now);
            out.push(memory.clone());
        }
        Ok(out)
    }

    async fn get_and_touch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Memory>> {
        let mut state = self.state.lock().await;
        Ok(state
            .memories
            .iter_mut()
            .find(|m| m.id == id && m.user_id == user_id)
            .map(|m| {
                m.access_count += 1;
                m.last_accessed = Some(Utc::now());
                m.clone()
            }))
    }

    async fn fetch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Memory>> {
        let state = self.state.lock().await;
        Ok(state
            .memories
            .iter()
            .find(|m| m.id == id && m.user_id == user_id)
            .cloned())
    }

    async fn list(
        &self,
        user_id: Uuid,
        include_inactive: bool,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let state = self.state.lock().await;
        Ok(state
            .memories
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id && (include_inactive || m.is_active))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        update: &MemoryUpdate,
        expires_at: Option<Option<DateTime<Utc>>>,
    ) -> Result<Option<Memory>> {
        let mut state = self.state.lock().await;
        let Some(memory) = state
            .memories
            .iter_mut()
            .find(|m| m.id == id && m.user_id == user_id)
        else {
            return Ok(None);
        };

        if let Some(content) = &update.content {
            memory.content = content.clone();
        }
        if let Some(importance) = update.importance {
            memory.importance = importance;
        }
        if let Some(category) = &update.category {
            memory.category = category.clone();
        }
        if let Some(tags) = &update.tags {
            memory.tags = tags.clone();
        }
        if let Some(active) = update.is_active {
            memory.is_active = active;
        }
        if let Some(expiry) = expires_at {
            memory.expires_at = expiry;
        }
        memory.updated_at = Utc::now();
        Ok(Some(memory.clone()))
    }

    async fn set_active(&self, id: Uuid, user_id: Uuid, active: bool) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .memories
            .iter_mut()
            .find(|m| m.id == id && m.user_id == user_id)
        {
            Some(memory) => {
                memory.is_active = active;
                memory.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_expired(&self, user_id: Option<Uuid>, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for memory in state
            .memories
            .iter_mut()
            .filter(|m| user_id.map_or(true, |u| m.user_id == u))
        {
            if memory.is_expired_at(now) {
                memory.is_active = false;
                memory.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }
}
