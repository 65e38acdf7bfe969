//! Caching decorator for any [`RetrievalIndex`].

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use ragmem_core::defaults::{SEARCH_CACHE_PREFIX, SEARCH_CACHE_TTL_SECS};
use ragmem_core::{CacheBackend, NewChunk, Result, RetrievalIndex, SearchRequest, SearchResult};

use crate::cache::{search_key, user_prefix};

/// Wraps an index with a search-result cache.
///
/// Cache failures are logged and bypassed; they never fail a search.
///
/// A search that overlaps an invalidation of its user's entries does not
/// cache its (possibly stale) results.
pub struct CachedIndex {
    inner: Arc<dyn RetrievalIndex>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
    /// Bumped by every full invalidation.
    epoch: AtomicU64,
    /// Bumped per user by every prefix invalidation.
    generations: Mutex<HashMap<Uuid, u64>>,
}

/// Invalidation state a search started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    epoch: u64,
    user: u64,
}

impl CachedIndex {
    pub fn new(inner: Arc<dyn RetrievalIndex>, cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            inner,
            cache,
            ttl: Duration::from_secs(SEARCH_CACHE_TTL_SECS),
            epoch: AtomicU64::new(0),
            generations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Name of the underlying cache backend.
    pub fn cache_name(&self) -> &'static str {
        self.cache.name()
    }

    fn generation(&self, user_id: Uuid) -> Generation {
        let generations = self.generations.lock().unwrap_or_else(|p| p.into_inner());
        Generation {
            epoch: self.epoch.load(Ordering::SeqCst),
            user: generations.get(&user_id).copied().unwrap_or(0),
        }
    }

    fn bump_user(&self, user_id: Uuid) {
        let mut generations = self.generations.lock().unwrap_or_else(|p| p.into_inner());
        *generations.entry(user_id).or_insert(0) += 1;
    }

    async fn invalidate(&self, prefix: &str) {
        match self.cache.delete_prefix(prefix).await {
            Ok(removed) => debug!(
                subsystem = "search",
                component = "search_cache",
                op = "invalidate",
                prefix,
                removed,
                "Search cache invalidated"
            ),
            Err(e) => warn!(
                subsystem = "search",
                component = "search_cache",
                op = "invalidate",
                prefix,
                error = %e,
                "Search cache invalidation failed"
            ),
        }
    }

    async fn lookup(&self, key: &str) -> Option<Vec<SearchResult>> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(results) => Some(results),
                Err(e) => {
                    warn!(
                        subsystem = "search",
                        component = "search_cache",
                        op = "get",
                        error = %e,
                        "Discarding undecodable cache entry"
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(
                    subsystem = "search",
                    component = "search_cache",
                    op = "get",
                    backend = self.cache.name(),
                    error = %e,
                    "Cache read failed, bypassing"
                );
                None
            }
        }
    }

    async fn store(&self, key: &str, results: &[SearchResult]) {
        let raw = match serde_json::to_string(results) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(subsystem = "search", component = "search_cache", error = %e, "Cache encode failed");
                return;
            }
        };
        if let Err(e) = self.cache.set_with_ttl(key, &raw, self.ttl).await {
            warn!(
                subsystem = "search",
                component = "search_cache",
                op = "set",
                backend = self.cache.name(),
                error = %e,
                "Cache write failed, bypassing"
            );
        }
    }
}

#[async_trait]
impl RetrievalIndex for CachedIndex {
    async fn index(&self, chunks: &[NewChunk]) -> Result<Vec<Uuid>> {
        let ids = self.inner.index(chunks).await?;
        let users: BTreeSet<Uuid> = chunks.iter().map(|c| c.user_id).collect();
        for user in users {
            self.bump_user(user);
            self.invalidate(&user_prefix(user)).await;
        }
        Ok(ids)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let key = search_key(request);
        if let Some(hit) = self.lookup(&key).await {
            debug!(
                subsystem = "search",
                component = "search_cache",
                op = "get",
                result_count = hit.len(),
                "Cache HIT"
            );
            return Ok(hit);
        }

        let started = self.generation(request.user_id);
        let results = self.inner.search(request).await?;
        if self.generation(request.user_id) != started {
            debug!(
                subsystem = "search",
                component = "search_cache",
                op = "set",
                "Index changed during search, not caching"
            );
            return Ok(results);
        }
        self.store(&key, &results).await;
        // An invalidation may have run between the check and the write.
        if self.generation(request.user_id) != started {
            self.invalidate(&key).await;
        }
        Ok(results)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<u64> {
        let removed = self.inner.delete_by_document(document_id).await?;
        // Ownership is unknown here, so every user's entries go.
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.invalidate(SEARCH_CACHE_PREFIX).await;
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoopCache};
    use crate::keyword::KeywordIndex;
    use ragmem_core::Error;
    use ragmem_db::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts searches reaching the wrapped index.
    struct CountingIndex {
        inner: KeywordIndex,
        searches: AtomicUsize,
    }

    #[async_trait]
    impl RetrievalIndex for CountingIndex {
        async fn index(&self, chunks: &[NewChunk]) -> Result<Vec<Uuid>> {
            self.inner.index(chunks).await
        }
        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.inner.search(request).await
        }
        async fn delete_by_document(&self, document_id: Uuid) -> Result<u64> {
            self.inner.delete_by_document(document_id).await
        }
        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    /// A cache whose every call fails.
    struct BrokenCache;

    #[async_trait]
    impl CacheBackend for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Cache("connection refused".into()))
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(Error::Cache("connection refused".into()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
            Err(Error::Cache("connection refused".into()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn counting() -> Arc<CountingIndex> {
        Arc::new(CountingIndex {
            inner: KeywordIndex::new(Arc::new(InMemoryStore::new())),
            searches: AtomicUsize::new(0),
        })
    }

    fn chunk(doc: Uuid, user: Uuid, content: &str) -> NewChunk {
        NewChunk {
            document_id: doc,
            user_id: user,
            chunk_index: 0,
            content: content.to_string(),
            title: "doc.md".to_string(),
        }
    }

    #[tokio::test]
    async fn test_repeat_search_hits_cache() {
        let inner = counting();
        let cached = CachedIndex::new(inner.clone(), Arc::new(MemoryCache::new(16)));
        let user = Uuid::now_v7();
        cached
            .index(&[chunk(Uuid::now_v7(), user, "incident runbook")])
            .await
            .unwrap();

        let first = cached
            .search(&SearchRequest::new("incident runbook", user))
            .await
            .unwrap();
        let second = cached
            .search(&SearchRequest::new("  INCIDENT   runbook ", user))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(inner.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_index_invalidates_only_that_user() {
        let inner = counting();
        let cache = Arc::new(MemoryCache::new(16));
        let cached = CachedIndex::new(inner.clone(), cache.clone());
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());

        cached.search(&SearchRequest::new("budget", alice)).await.unwrap();
        cached.search(&SearchRequest::new("budget", bob)).await.unwrap();
        assert_eq!(cache.len().await, 2);

        cached
            .index(&[chunk(Uuid::now_v7(), alice, "budget review")])
            .await
            .unwrap();
        assert_eq!(cache.len().await, 1);

        // Alice sees her new chunk instead of a stale empty result.
        let fresh = cached.search(&SearchRequest::new("budget", alice)).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(inner.searches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_delete_invalidates_everything() {
        let inner = counting();
        let cache = Arc::new(MemoryCache::new(16));
        let cached = CachedIndex::new(inner, cache.clone());
        let user = Uuid::now_v7();
        let doc = Uuid::now_v7();
        cached.index(&[chunk(doc, user, "release notes")]).await.unwrap();
        cached.search(&SearchRequest::new("release", user)).await.unwrap();
        cached
            .search(&SearchRequest::new("notes", Uuid::now_v7()))
            .await
            .unwrap();

        assert_eq!(cached.delete_by_document(doc).await.unwrap(), 1);
        assert!(cache.is_empty().await);
        assert!(cached
            .search(&SearchRequest::new("release", user))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_noop_cache_always_delegates() {
        let inner = counting();
        let cached = CachedIndex::new(inner.clone(), Arc::new(NoopCache));
        let user = Uuid::now_v7();
        cached.index(&[chunk(Uuid::now_v7(), user, "oncall rota")]).await.unwrap();

        for _ in 0..3 {
            let hits = cached.search(&SearchRequest::new("oncall", user)).await.unwrap();
            assert_eq!(hits.len(), 1);
        }
        assert_eq!(inner.searches.load(Ordering::SeqCst), 3);
        assert_eq!(cached.cache_name(), "none");
    }

    #[tokio::test]
    async fn test_cache_failures_are_bypassed() {
        let inner = counting();
        let cached = CachedIndex::new(inner, Arc::new(BrokenCache));
        let user = Uuid::now_v7();
        let doc = Uuid::now_v7();

        cached.index(&[chunk(doc, user, "pager duty")]).await.unwrap();
        let hits = cached.search(&SearchRequest::new("pager", user)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(cached.delete_by_document(doc).await.unwrap(), 1);
    }

    /// Parks its first search after reading the index, until released.
    struct ParkedIndex {
        inner: KeywordIndex,
        park_next: std::sync::atomic::AtomicBool,
        parked: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl RetrievalIndex for ParkedIndex {
        async fn index(&self, chunks: &[NewChunk]) -> Result<Vec<Uuid>> {
            self.inner.index(chunks).await
        }
        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
            let results = self.inner.search(request).await?;
            if self.park_next.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            Ok(results)
        }
        async fn delete_by_document(&self, document_id: Uuid) -> Result<u64> {
            self.inner.delete_by_document(document_id).await
        }
        fn backend_name(&self) -> &'static str {
            "parked"
        }
    }

    #[tokio::test]
    async fn test_search_overlapping_index_is_not_cached() {
        let inner = Arc::new(ParkedIndex {
            inner: KeywordIndex::new(Arc::new(InMemoryStore::new())),
            park_next: std::sync::atomic::AtomicBool::new(true),
            parked: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let cache = Arc::new(MemoryCache::new(16));
        let cached = Arc::new(CachedIndex::new(inner.clone(), cache.clone()));
        let user = Uuid::now_v7();

        let in_flight = {
            let cached = cached.clone();
            tokio::spawn(async move { cached.search(&SearchRequest::new("budget", user)).await })
        };
        inner.parked.notified().await;

        // New chunks land while the search holds pre-index results.
        cached
            .index(&[chunk(Uuid::now_v7(), user, "budget review")])
            .await
            .unwrap();
        inner.release.notify_one();

        let stale = in_flight.await.unwrap().unwrap();
        assert!(stale.is_empty());
        assert!(cache.is_empty().await);

        let fresh = cached.search(&SearchRequest::new("budget", user)).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(cache.len().await, 1);
    }
}
