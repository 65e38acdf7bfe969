//! Token-overlap retrieval without embeddings.
//!
//! Ranking: `score = matched_distinct_tokens / total_query_tokens`, then total
//! occurrences of all tokens, then recency.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument};
use uuid::Uuid;

use ragmem_core::defaults::{KEYWORD_CANDIDATE_LIMIT, TOP_K_MAX};
use ragmem_core::{
    ChunkRepository, DocumentChunk, NewChunk, Result, RetrievalIndex, SearchRequest, SearchResult,
};

use crate::tokenizer::tokenize;

/// Keyword index over raw chunk text.
pub struct KeywordIndex {
    chunks: Arc<dyn ChunkRepository>,
    candidate_limit: usize,
}

impl KeywordIndex {
    pub fn new(chunks: Arc<dyn ChunkRepository>) -> Self {
        Self {
            chunks,
            candidate_limit: KEYWORD_CANDIDATE_LIMIT,
        }
    }

    /// How many matching chunks are pulled from storage before ranking.
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(1);
        self
    }
}

struct Scored {
    chunk: DocumentChunk,
    score: f32,
    occurrences: usize,
}

/// Score one chunk against the query tokens. `None` when nothing matches.
fn score_chunk(chunk: DocumentChunk, tokens: &[String]) -> Option<Scored> {
    let content = chunk.content.to_lowercase();
    let mut matched = 0usize;
    let mut occurrences = 0usize;
    for token in tokens {
        let n = content.matches(token.as_str()).count();
        if n > 0 {
            matched += 1;
            occurrences += n;
        }
    }
    if matched == 0 {
        return None;
    }
    Some(Scored {
        chunk,
        score: matched as f32 / tokens.len() as f32,
        occurrences,
    })
}

/// Rank candidates; ties keep candidate order.
fn rank(candidates: Vec<DocumentChunk>, tokens: &[String], top_k: usize) -> Vec<SearchResult> {
    let mut scored: Vec<Scored> = candidates
        .into_iter()
        .filter_map(|c| score_chunk(c, tokens))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.occurrences.cmp(&a.occurrences))
            .then(b.chunk.created_at.cmp(&a.chunk.created_at))
    });
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|s| SearchResult {
            chunk_id: s.chunk.id,
            document_id: s.chunk.document_id,
            title: s.chunk.title,
            content: s.chunk.content,
            score: s.score,
            created_at: s.chunk.created_at,
        })
        .collect()
}

#[async_trait]
impl RetrievalIndex for KeywordIndex {
    async fn index(&self, chunks: &[NewChunk]) -> Result<Vec<Uuid>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }
        self.chunks.insert_batch(chunks, None).await
    }

    #[instrument(skip(self, request), fields(
        subsystem = "search",
        component = "keyword_index",
        op = "search",
        user_id = %request.user_id,
        top_k = request.top_k,
    ))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let top_k = request.top_k.min(TOP_K_MAX);
        let tokens = tokenize(&request.query);
        if tokens.is_empty() || top_k == 0 {
            debug!("No usable query tokens");
            return Ok(vec![]);
        }
        if matches!(&request.document_ids, Some(ids) if ids.is_empty()) {
            return Ok(vec![]);
        }
        let start = Instant::now();

        let candidates = self
            .chunks
            .find_containing(
                request.user_id,
                &tokens,
                request.document_ids.as_deref(),
                self.candidate_limit,
            )
            .await?;
        let candidate_count = candidates.len();
        let results = rank(candidates, &tokens, top_k);

        debug!(
            token_count = tokens.len(),
            candidate_count,
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Keyword search complete"
        );
        Ok(results)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<u64> {
        self.chunks.delete_for_document(document_id).await
    }

    fn backend_name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ragmem_db::InMemoryStore;

    fn chunk(doc: Uuid, user: Uuid, index: i32, content: &str) -> NewChunk {
        NewChunk {
            document_id: doc,
            user_id: user,
            chunk_index: index,
            content: content.to_string(),
            title: "notes.txt".to_string(),
        }
    }

    fn stored(content: &str, age_secs: i64) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::now_v7(),
            document_id: Uuid::nil(),
            user_id: Uuid::nil(),
            chunk_index: 0,
            content: content.to_string(),
            title: "t".to_string(),
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rank_by_match_ratio_then_occurrences_then_recency() {
        let q = tokens(&["budget", "travel"]);
        let candidates = vec![
            stored("travel only", 30),
            stored("budget and travel", 20),
            stored("budget travel budget travel", 10),
            stored("travel travel", 5),
            stored("travel again", 1),
        ];

        let ranked = rank(candidates, &q, 10);
        let order: Vec<&str> = ranked.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "budget travel budget travel",
                "budget and travel",
                "travel travel",
                "travel again",
                "travel only",
            ]
        );
        assert_eq!(ranked[0].score, 1.0);
        assert_eq!(ranked[4].score, 0.5);
    }

    #[test]
    fn test_rank_truncates_and_drops_non_matching() {
        let q = tokens(&["alpha"]);
        let ranked = rank(
            vec![stored("alpha", 3), stored("beta", 2), stored("ALPHA alpha", 1)],
            &q,
            1,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].content, "ALPHA alpha");
    }

    #[tokio::test]
    async fn test_search_end_to_end() {
        let store = Arc::new(InMemoryStore::new());
        let index = KeywordIndex::new(store);
        let user = Uuid::now_v7();
        let doc = Uuid::now_v7();

        index
            .index(&[
                chunk(doc, user, 0, "Annual leave is 15 days per year."),
                chunk(doc, user, 1, "Travel expenses need a receipt."),
                chunk(doc, user, 2, "年假政策：每年十五天。"),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&SearchRequest::new("How many days of annual leave?", user))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.starts_with("Annual leave"));
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);

        let cjk = index
            .search(&SearchRequest::new("年假政策", user))
            .await
            .unwrap();
        assert_eq!(cjk.len(), 1);
        assert_eq!(cjk[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_stop_word_only_query_returns_empty() {
        let store = Arc::new(InMemoryStore::new());
        let index = KeywordIndex::new(store);
        let user = Uuid::now_v7();
        index
            .index(&[chunk(Uuid::now_v7(), user, 0, "what is this")])
            .await
            .unwrap();

        let hits = index
            .search(&SearchRequest::new("what is the", user))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_tenant_scoped() {
        let store = Arc::new(InMemoryStore::new());
        let index = KeywordIndex::new(store);
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
        index
            .index(&[chunk(Uuid::now_v7(), alice, 0, "quarterly revenue report")])
            .await
            .unwrap();

        let hits = index
            .search(&SearchRequest::new("quarterly revenue", bob))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_document_allowlist_and_delete() {
        let store = Arc::new(InMemoryStore::new());
        let index = KeywordIndex::new(store);
        let user = Uuid::now_v7();
        let (doc_a, doc_b) = (Uuid::now_v7(), Uuid::now_v7());
        index
            .index(&[
                chunk(doc_a, user, 0, "deployment checklist"),
                chunk(doc_b, user, 0, "deployment rollback"),
            ])
            .await
            .unwrap();

        let scoped = index
            .search(&SearchRequest::new("deployment", user).with_documents(vec![doc_b]))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].document_id, doc_b);

        assert_eq!(index.delete_by_document(doc_b).await.unwrap(), 1);
        let remaining = index
            .search(&SearchRequest::new("deployment", user))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].document_id, doc_a);
    }
}
