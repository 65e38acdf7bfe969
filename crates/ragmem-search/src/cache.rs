//! Search cache backends and key construction.
//!
//! Keys have the shape
//! `ragmem:search:{user_id}:{sha256(normalized query)[..16]}:{top_k}:{scope}`
//! so that everything cached for one user shares the prefix
//! `ragmem:search:{user_id}:` and can be dropped in one call.
//!
//! Three backends implement [`CacheBackend`]:
//! - [`RedisCache`]: shared cache over a redis `ConnectionManager`
//! - [`MemoryCache`]: process-local LRU with per-entry TTL
//! - [`NoopCache`]: stores nothing

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use ragmem_core::defaults::{SEARCH_CACHE_CAPACITY, SEARCH_CACHE_HASH_LEN, SEARCH_CACHE_PREFIX};
use ragmem_core::{CacheBackend, Error, Result, SearchRequest};

// =============================================================================
// KEYS
// =============================================================================

/// Trim, lowercase, and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn short_hash(input: &str) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..SEARCH_CACHE_HASH_LEN].to_string()
}

/// Prefix shared by every search key of one user.
pub fn user_prefix(user_id: Uuid) -> String {
    format!("{}{}:", SEARCH_CACHE_PREFIX, user_id)
}

/// `all`, or a hash of the sorted document allowlist.
pub fn scope_component(document_ids: Option<&[Uuid]>) -> String {
    match document_ids {
        None => "all".to_string(),
        Some(ids) => {
            let mut sorted: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            sorted.sort();
            sorted.dedup();
            short_hash(&sorted.join(","))
        }
    }
}

/// Cache key for a search request.
pub fn search_key(request: &SearchRequest) -> String {
    format!(
        "{}{}:{}:{}",
        user_prefix(request.user_id),
        short_hash(&normalize_query(&request.query)),
        request.top_k,
        scope_component(request.document_ids.as_deref())
    )
}

// =============================================================================
// REDIS
// =============================================================================

/// Search cache backed by Redis.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Connect to `url`. The connection manager reconnects on its own after failures.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Cache(format!("Failed to connect to Redis: {}", e)))?;

        info!(
            subsystem = "search",
            component = "search_cache",
            backend = "redis",
            url = %url.replace(|c: char| c.is_ascii_alphanumeric(), "*"),
            "Redis search cache connected"
        );
        Ok(Self { connection })
    }
}

fn cache_error(op: &str, e: redis::RedisError) -> Error {
    Error::Cache(format!("Redis {} error: {}", op, e))
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| cache_error("GET", e))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| cache_error("SET", e))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| cache_error("SCAN", e))?;

            if !keys.is_empty() {
                removed += conn
                    .del::<_, u64>(&keys)
                    .await
                    .map_err(|e| cache_error("DEL", e))?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(
            subsystem = "search",
            component = "search_cache",
            op = "delete_prefix",
            prefix,
            removed,
            "Cache invalidated"
        );
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// IN-PROCESS LRU
// =============================================================================

/// Process-local LRU cache with per-entry expiry.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, (String, Instant)>>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(SEARCH_CACHE_CAPACITY)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                return Ok(Some(value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.put(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        Ok(doomed.len() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// NO-OP
// =============================================================================

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
