//! Error types for ragmem.

use thiserror::Error;

/// Result type alias using ragmem's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ragmem operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document missing or not owned by the caller
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Memory missing or not owned by the caller
    #[error("Memory not found: {0}")]
    MemoryNotFound(uuid::Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Text extraction backend failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// No extractor is registered for the file type
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Index state does not match the document (e.g. nothing to index)
    #[error("Index inconsistency: {0}")]
    IndexInconsistency(String),

    /// Search cache backend failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Operation was cancelled by the caller
    #[error("Cancelled")]
    Cancelled,

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape, rejected before any work runs.
    Validation,
    /// Referenced record is missing or owned by someone else.
    NotFound,
    /// Embedding, generation, or extraction backend failed.
    Provider,
    /// Indexing was attempted with nothing consistent to index.
    IndexInconsistency,
    /// Storage, cache, configuration, and everything else.
    Infrastructure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::Validation,
            Error::NotFound(_) | Error::DocumentNotFound(_) | Error::MemoryNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::Embedding(_)
            | Error::Inference(_)
            | Error::Extraction(_)
            | Error::UnsupportedFormat(_)
            | Error::Parse(_)
            | Error::Request(_) => ErrorKind::Provider,
            Error::IndexInconsistency(_) => ErrorKind::IndexInconsistency,
            Error::Database(_)
            | Error::Cache(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Cancelled
            | Error::Io(_) => ErrorKind::Infrastructure,
        }
    }

    /// True for errors that should be degraded rather than surfaced.
    pub fn is_provider(&self) -> bool {
        self.kind() == ErrorKind::Provider
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
