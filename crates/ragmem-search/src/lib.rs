//! # ragmem-search
//!
//! Retrieval for ragmem: two interchangeable [`RetrievalIndex`] variants and
//! a caching decorator.
//!
//! This crate provides:
//! - [`VectorIndex`]: cosine similarity over provider embeddings
//! - [`KeywordIndex`]: token overlap ranking, CJK aware
//! - [`CachedIndex`]: per-user search cache over Redis, an in-process LRU, or nothing
//!
//! ## Example
//!
//! ```ignore
//! use ragmem_search::{build_cache, build_index, RetrievalSettings};
//!
//! let cache = build_cache(&settings).await?;
//! let index = build_index(&settings, Arc::new(db.chunks.clone()), embedder, cache);
//! let hits = index.search(&SearchRequest::new("vacation policy", user_id)).await?;
//! ```

pub mod backend;
pub mod cache;
pub mod cached;
pub mod keyword;
pub mod tokenizer;
pub mod vector;

// Re-export core types
pub use ragmem_core::*;

pub use backend::{build_cache, build_index, CacheKind, RetrievalBackend, RetrievalSettings};
pub use cache::{normalize_query, search_key, user_prefix, MemoryCache, NoopCache, RedisCache};
pub use cached::CachedIndex;
pub use keyword::KeywordIndex;
pub use tokenizer::{has_cjk, is_cjk, tokenize};
pub use vector::VectorIndex;
