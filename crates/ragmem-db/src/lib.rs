//! # ragmem-db
//!
//! Storage layer for ragmem.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL + pgvector repositories for documents, chunks, and memories
//! - An in-memory store implementing the same traits
//! - Boundary-aware text chunking
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragmem_db::{Database, MemoryRepository, NewMemory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/ragmem").await?;
//!     let memory = db
//!         .memories
//!         .insert(user_id, &NewMemory::new("Prefers concise answers", 0.8), None)
//!         .await?;
//!     println!("Stored memory: {}", memory.id);
//!     Ok(())
//! }
//! ```
pub mod chunking;
pub mod chunks;
pub mod documents;
pub mod in_memory;
pub mod memories;
pub mod pool;

use sqlx::PgPool;

// Re-export core types
pub use ragmem_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// Re-export chunking types
pub use chunking::{chunk_text, Boundary, Chunk, Chunker, ChunkerConfig, TextChunker};

// Re-export repository implementations
pub use chunks::PgChunkRepository;
pub use documents::PgDocumentRepository;
pub use in_memory::{cosine_similarity, InMemoryStore};
pub use memories::PgMemoryRepository;
pub use pool::{connect_pool, log_pool_metrics, PoolConfig, DB_IDLE_TIMEOUT_SECS};

/// Postgres-backed repositories sharing one pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    pub documents: PgDocumentRepository,
    pub chunks: PgChunkRepository,
    pub memories: PgMemoryRepository,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            chunks: PgChunkRepository::new(pool.clone()),
            memories: PgMemoryRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with [`PoolConfig::default`].
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(connect_pool(url, &config).await?))
    }

    /// Apply migrations from `migrations/` that have not run yet.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        tracing::info!(subsystem = "database", op = "migrate", "Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Log final pool occupancy and close every connection.
    pub async fn close(&self) {
        log_pool_metrics(&self.pool);
        self.pool.close().await;
    }
}
