//! Startup-time selection of the retrieval variant and search cache.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ragmem_core::{CacheBackend, ChunkRepository, EmbeddingBackend, Error, Result, RetrievalIndex};

use crate::cache::{MemoryCache, NoopCache, RedisCache};
use crate::cached::CachedIndex;
use crate::keyword::KeywordIndex;
use crate::vector::VectorIndex;

/// Which retrieval variant serves searches (`RETRIEVAL_BACKEND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackend {
    #[default]
    Vector,
    Keyword,
}

impl fmt::Display for RetrievalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

impl FromStr for RetrievalBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "keyword" => Ok(Self::Keyword),
            other => Err(format!("unknown retrieval backend: {}", other)),
        }
    }
}

/// Which cache sits in front of the index (`SEARCH_CACHE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Redis,
    #[default]
    Memory,
    None,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::Memory => write!(f, "memory"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown search cache: {}", other)),
        }
    }
}

/// Everything needed to assemble the retrieval stack.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub backend: RetrievalBackend,
    pub similarity_threshold: f32,
    pub embed_timeout: Duration,
    pub cache: CacheKind,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub redis_url: Option<String>,
}

/// Create the configured cache backend.
///
/// An unreachable Redis falls back to no caching rather than failing startup.
pub async fn build_cache(settings: &RetrievalSettings) -> Result<Arc<dyn CacheBackend>> {
    let cache: Arc<dyn CacheBackend> = match settings.cache {
        CacheKind::None => Arc::new(NoopCache),
        CacheKind::Memory => Arc::new(MemoryCache::new(settings.cache_capacity)),
        CacheKind::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .ok_or_else(|| Error::Config("SEARCH_CACHE=redis requires REDIS_URL".into()))?;
            match RedisCache::connect(url).await {
                Ok(redis) => Arc::new(redis),
                Err(e) => {
                    warn!(
                        subsystem = "search",
                        component = "search_cache",
                        error = %e,
                        "Redis unavailable, search cache disabled"
                    );
                    Arc::new(NoopCache)
                }
            }
        }
    };
    Ok(cache)
}

/// Build the configured index variant wrapped in the search cache.
pub fn build_index(
    settings: &RetrievalSettings,
    chunks: Arc<dyn ChunkRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    cache: Arc<dyn CacheBackend>,
) -> Arc<dyn RetrievalIndex> {
    let inner: Arc<dyn RetrievalIndex> = match settings.backend {
        RetrievalBackend::Vector => Arc::new(
            VectorIndex::new(chunks, embedder)
                .with_threshold(settings.similarity_threshold)
                .with_timeout(settings.embed_timeout),
        ),
        RetrievalBackend::Keyword => Arc::new(KeywordIndex::new(chunks)),
    };

    info!(
        subsystem = "search",
        component = "retrieval",
        backend = inner.backend_name(),
        cache = cache.name(),
        cache_ttl_secs = settings.cache_ttl.as_secs(),
        "Retrieval index ready"
    );

    Arc::new(CachedIndex::new(inner, cache).with_ttl(settings.cache_ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragmem_core::defaults::{RETRIEVAL_TIMEOUT_SECS, SEARCH_CACHE_TTL_SECS, SIMILARITY_THRESHOLD};
    use ragmem_db::InMemoryStore;
    use ragmem_inference::MockInferenceBackend;

    fn settings(backend: RetrievalBackend, cache: CacheKind) -> RetrievalSettings {
        RetrievalSettings {
            backend,
            similarity_threshold: SIMILARITY_THRESHOLD,
            embed_timeout: Duration::from_secs(RETRIEVAL_TIMEOUT_SECS),
            cache,
            cache_capacity: 16,
            cache_ttl: Duration::from_secs(SEARCH_CACHE_TTL_SECS),
            redis_url: None,
        }
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("vector".parse::<RetrievalBackend>(), Ok(RetrievalBackend::Vector));
        assert_eq!(" Keyword ".parse::<RetrievalBackend>(), Ok(RetrievalBackend::Keyword));
        assert!("bm25".parse::<RetrievalBackend>().is_err());
        assert_eq!(RetrievalBackend::default(), RetrievalBackend::Vector);
        assert_eq!(RetrievalBackend::Keyword.to_string(), "keyword");
    }

    #[test]
    fn test_cache_kind_parsing() {
        assert_eq!("redis".parse::<CacheKind>(), Ok(CacheKind::Redis));
        assert_eq!("none".parse::<CacheKind>(), Ok(CacheKind::None));
        assert_eq!(CacheKind::default(), CacheKind::Memory);
        assert!("memcached".parse::<CacheKind>().is_err());
    }

    #[tokio::test]
    async fn test_build_selects_variant() {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(MockInferenceBackend::new());

        for (backend, name) in [
            (RetrievalBackend::Vector, "vector"),
            (RetrievalBackend::Keyword, "keyword"),
        ] {
            let s = settings(backend, CacheKind::Memory);
            let cache = build_cache(&s).await.unwrap();
            assert_eq!(cache.name(), "memory");
            let index = build_index(&s, store.clone(), embedder.clone(), cache);
            assert_eq!(index.backend_name(), name);
        }
    }

    #[tokio::test]
    async fn test_redis_without_url_is_config_error() {
        let s = settings(RetrievalBackend::Keyword, CacheKind::Redis);
        assert!(matches!(build_cache(&s).await, Err(Error::Config(_))));
    }
}
