//! Application configuration from environment variables.
//!
//! Every default lives in [`ragmem_core::defaults`]; unset variables fall
//! back to it and malformed ones are an [`Error::Config`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ragmem_core::defaults::{
    ALLOWED_EXTENSIONS, CHAT_MEMORY_LIMIT, CHAT_TEMPERATURE, CHAT_TEMPERATURE_MAX, CHUNK_MIN_SIZE,
    CHUNK_OVERLAP, CHUNK_SIZE, HISTORY_WINDOW, MAX_UPLOAD_SIZE_BYTES, RETRIEVAL_TIMEOUT_SECS,
    SEARCH_CACHE_CAPACITY, SEARCH_CACHE_TTL_SECS, SIMILARITY_THRESHOLD, TOP_K, TOP_K_MAX,
};
use ragmem_core::{env, Error, Result};
use ragmem_db::{ChunkerConfig, PoolConfig};
use ragmem_inference::OpenAIConfig;
use ragmem_jobs::WorkerConfig;
use ragmem_search::{CacheKind, RetrievalBackend, RetrievalSettings};

use crate::documents::UploadSettings;
use crate::orchestrator::ChatSettings;
use crate::telemetry::LogConfig;

/// Which inference backend serves embeddings and completions (`INFERENCE_BACKEND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceKind {
    #[default]
    OpenAI,
    Mock,
}

impl fmt::Display for InferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for InferenceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown inference backend: {}", other)),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Postgres URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub pool: PoolConfig,
    pub retrieval: RetrievalSettings,
    pub chunker: ChunkerConfig,
    pub chat: ChatSettings,
    pub worker: WorkerConfig,
    pub uploads: UploadSettings,
    pub inference: InferenceKind,
    pub openai: OpenAIConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            pool: PoolConfig::default(),
            retrieval: RetrievalSettings {
                backend: RetrievalBackend::default(),
                similarity_threshold: SIMILARITY_THRESHOLD,
                embed_timeout: Duration::from_secs(RETRIEVAL_TIMEOUT_SECS),
                cache: CacheKind::default(),
                cache_capacity: SEARCH_CACHE_CAPACITY,
                cache_ttl: Duration::from_secs(SEARCH_CACHE_TTL_SECS),
                redis_url: None,
            },
            chunker: ChunkerConfig::default(),
            chat: ChatSettings::default(),
            worker: WorkerConfig::default(),
            uploads: UploadSettings::default(),
            inference: InferenceKind::default(),
            openai: OpenAIConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | unset: in-memory store |
    /// | `RETRIEVAL_BACKEND` | `vector` |
    /// | `SIMILARITY_THRESHOLD` | `0.6` |
    /// | `TOP_K` | `5` |
    /// | `CHUNK_SIZE` / `CHUNK_OVERLAP` / `CHUNK_MIN_SIZE` | `512` / `50` / `50` |
    /// | `SEARCH_CACHE` | `memory` |
    /// | `REDIS_URL` | unset |
    /// | `SEARCH_CACHE_TTL_SECS` | `300` |
    /// | `HISTORY_WINDOW` | `10` |
    /// | `RETRIEVAL_TIMEOUT_SECS` | `30` |
    /// | `CHAT_MEMORY_LIMIT` | `3` |
    /// | `CHAT_TEMPERATURE` | `0.7` |
    /// | `MAX_UPLOAD_SIZE_BYTES` | `52428800` |
    /// | `INFERENCE_BACKEND` | `openai` |
    ///
    /// Pool, worker, logging, and `OPENAI_*` variables are read by their own
    /// `from_env` constructors.
    pub fn from_env() -> Result<Self> {
        let retrieval_timeout = Duration::from_secs(env::parse_or(
            "RETRIEVAL_TIMEOUT_SECS",
            RETRIEVAL_TIMEOUT_SECS,
        )?);

        let config = Self {
            database_url: env::var("DATABASE_URL"),
            pool: PoolConfig::from_env()?,
            retrieval: RetrievalSettings {
                backend: env::parse_or("RETRIEVAL_BACKEND", RetrievalBackend::default())?,
                similarity_threshold: env::parse_or("SIMILARITY_THRESHOLD", SIMILARITY_THRESHOLD)?,
                embed_timeout: retrieval_timeout,
                cache: env::parse_or("SEARCH_CACHE", CacheKind::default())?,
                cache_capacity: env::parse_or("SEARCH_CACHE_CAPACITY", SEARCH_CACHE_CAPACITY)?,
                cache_ttl: Duration::from_secs(env::parse_or(
                    "SEARCH_CACHE_TTL_SECS",
                    SEARCH_CACHE_TTL_SECS,
                )?),
                redis_url: env::var("REDIS_URL"),
            },
            chunker: ChunkerConfig {
                max_chunk_size: env::parse_or("CHUNK_SIZE", CHUNK_SIZE)?,
                min_chunk_size: env::parse_or("CHUNK_MIN_SIZE", CHUNK_MIN_SIZE)?,
                overlap: env::parse_or("CHUNK_OVERLAP", CHUNK_OVERLAP)?,
            },
            chat: ChatSettings {
                history_window: env::parse_or("HISTORY_WINDOW", HISTORY_WINDOW)?,
                retrieval_timeout,
                memory_limit: env::parse_or("CHAT_MEMORY_LIMIT", CHAT_MEMORY_LIMIT)?,
                default_temperature: env::parse_or("CHAT_TEMPERATURE", CHAT_TEMPERATURE)?,
                top_k: env::parse_or("TOP_K", TOP_K)?,
            },
            worker: WorkerConfig::from_env()?,
            uploads: UploadSettings {
                max_size_bytes: env::parse_or("MAX_UPLOAD_SIZE_BYTES", MAX_UPLOAD_SIZE_BYTES)?,
                allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            },
            inference: env::parse_or("INFERENCE_BACKEND", InferenceKind::default())?,
            openai: OpenAIConfig::from_env()?,
            log: LogConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that single-variable parsing cannot catch.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.retrieval.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "SIMILARITY_THRESHOLD must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.chunker.max_chunk_size == 0 {
            return Err(Error::Config("CHUNK_SIZE must be positive".into()));
        }
        if self.chunker.overlap >= self.chunker.max_chunk_size {
            return Err(Error::Config(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunker.overlap, self.chunker.max_chunk_size
            )));
        }
        let temperature = self.chat.default_temperature;
        if !(0.0..=CHAT_TEMPERATURE_MAX).contains(&temperature) {
            return Err(Error::Config(format!(
                "CHAT_TEMPERATURE must be within [0, {}], got {}",
                CHAT_TEMPERATURE_MAX, temperature
            )));
        }
        if self.chat.top_k == 0 || self.chat.top_k > TOP_K_MAX {
            return Err(Error::Config(format!(
                "TOP_K must be within [1, {}], got {}",
                TOP_K_MAX, self.chat.top_k
            )));
        }
        Ok(())
    }
}
