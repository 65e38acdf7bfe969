//! Centralized default constants for ragmem.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration loaders fall back to these when an environment variable is
//! unset, and tests assert against them instead of repeating literals.

// =============================================================================
// CHUNKING
// =============================================================================

/// Target characters per chunk.
pub const CHUNK_SIZE: usize = 512;

/// Non-final chunks shorter than this are merged into their predecessor.
pub const CHUNK_MIN_SIZE: usize = 50;

/// Characters shared between adjacent chunks.
pub const CHUNK_OVERLAP: usize = 50;

/// Sentence terminators the chunker backtracks to.
pub const CHUNK_BOUNDARIES: &[char] = &['。', '！', '？', '\n'];

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Default number of chunks returned per search.
pub const TOP_K: usize = 5;

/// Upper bound accepted for a caller supplied top_k.
pub const TOP_K_MAX: usize = 50;

/// Vector hits scoring below this cosine similarity are discarded.
pub const SIMILARITY_THRESHOLD: f32 = 0.6;

/// Timeout applied to the retrieval step of a chat request.
pub const RETRIEVAL_TIMEOUT_SECS: u64 = 30;

/// Chunks fetched from storage before keyword ranking.
pub const KEYWORD_CANDIDATE_LIMIT: usize = 500;

// =============================================================================
// SEARCH CACHE
// =============================================================================

/// Time-to-live for cached search results.
pub const SEARCH_CACHE_TTL_SECS: u64 = 300;

/// Key prefix for cached search results.
pub const SEARCH_CACHE_PREFIX: &str = "ragmem:search:";

/// Capacity of the in-process search cache.
pub const SEARCH_CACHE_CAPACITY: usize = 1024;

/// Hex characters of the query hash kept in a cache key.
pub const SEARCH_CACHE_HASH_LEN: usize = 16;

// =============================================================================
// MEMORY
// =============================================================================

/// Maximum characters of memory content.
pub const MEMORY_CONTENT_MAX: usize = 2000;

/// Maximum characters of a memory category label.
pub const MEMORY_CATEGORY_MAX: usize = 50;

/// Category assigned when none is given.
pub const MEMORY_CATEGORY_DEFAULT: &str = "general";

/// Default importance for new memories.
pub const MEMORY_IMPORTANCE_DEFAULT: f32 = 0.5;

/// Default number of memories returned by retrieve.
pub const MEMORY_RETRIEVE_LIMIT: usize = 5;

/// Number of memories pulled into a chat prompt.
pub const CHAT_MEMORY_LIMIT: usize = 3;

/// Default page size when listing memories.
pub const MEMORY_LIST_LIMIT: usize = 100;

/// Interval between background expiry sweeps (0 disables).
pub const MEMORY_CLEANUP_INTERVAL_SECS: u64 = 3600;

// =============================================================================
// CHAT
// =============================================================================

/// Conversation turns kept in the prompt.
pub const HISTORY_WINDOW: usize = 10;

/// Default sampling temperature.
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// Highest sampling temperature accepted.
pub const CHAT_TEMPERATURE_MAX: f32 = 2.0;

/// Marker emitted when neither retrieval nor memory produced context.
pub const NO_CONTEXT_MARKER: &str = "No relevant context found.";

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Maximum upload size in bytes (50 MiB).
pub const MAX_UPLOAD_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// File extensions accepted for ingestion.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md", "xlsx", "csv"];

/// Extension assumed when a file name has none.
pub const FALLBACK_FILE_TYPE: &str = "txt";

/// Characters of extracted text kept as the document summary.
pub const SUMMARY_LENGTH: usize = 200;

/// Default page size when listing documents.
pub const DOCUMENT_LIST_LIMIT: usize = 100;

/// Timeout for external extraction tools (pdftotext, pandoc, xlsx2csv).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// INFERENCE
// =============================================================================

/// OpenAI-compatible endpoint used when none is configured.
pub const OPENAI_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default embedding model.
pub const EMBED_MODEL: &str = "text-embedding-v2";

/// Default embedding dimension.
pub const EMBED_DIMENSION: usize = 1536;

/// Default generation model.
pub const GEN_MODEL: &str = "qwen-plus";

/// HTTP timeout for inference requests.
pub const INFERENCE_TIMEOUT_SECS: u64 = 120;

/// Maximum tokens requested for a chat completion.
pub const GEN_MAX_TOKENS: u32 = 2048;

// =============================================================================
// WORKER
// =============================================================================

/// Documents ingested concurrently.
pub const INGEST_MAX_CONCURRENT: usize = 4;

/// Depth of the ingestion submission queue.
pub const INGEST_QUEUE_CAPACITY: usize = 256;

/// Capacity of the ingestion event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Connection pool ceiling.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Idle connections kept open.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Seconds to wait when acquiring a connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;
