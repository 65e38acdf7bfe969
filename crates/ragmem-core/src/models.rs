//! Core data models for ragmem.
//!
//! These types are shared across all ragmem crates and represent the core
//! domain entities: documents, their chunks, search results, conversation
//! turns, and (in [`memory`]) long-term memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{FALLBACK_FILE_TYPE, SUMMARY_LENGTH, TOP_K};

pub mod memory;

pub use memory::*;

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Ingestion status of an uploaded document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

/// An uploaded document and its ingestion outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    /// File name without extension.
    pub title: String,
    pub file_name: String,
    pub file_path: String,
    /// Lowercased extension, e.g. `pdf`.
    pub file_type: String,
    pub mime_type: Option<String>,
    pub file_size: i64,
    /// SHA-256 of the file contents, hex encoded.
    pub file_hash: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub chunk_count: i32,
    pub total_chars: i64,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Input for registering a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub user_id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub mime_type: Option<String>,
    pub file_size: i64,
    pub file_hash: String,
}

impl NewDocument {
    /// Build a document record from an uploaded file name, deriving title and type.
    pub fn from_file_name(
        user_id: Uuid,
        file_name: &str,
        file_path: impl Into<String>,
        file_size: i64,
        file_hash: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            title: title_from_file_name(file_name),
            file_name: file_name.to_string(),
            file_path: file_path.into(),
            file_type: file_type_from_name(file_name),
            mime_type: None,
            file_size,
            file_hash: file_hash.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }
}

/// Per-user document totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub total_size: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// File name stem, or the whole name when there is no stem.
pub fn title_from_file_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

/// Lowercased extension, falling back to `txt`.
pub fn file_type_from_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => FALLBACK_FILE_TYPE.to_string(),
    }
}

/// Leading excerpt of extracted text, suffixed with `...` when cut.
pub fn summarize(text: &str) -> String {
    if text.chars().count() <= SUMMARY_LENGTH {
        return text.to_string();
    }
    let mut summary: String = text.chars().take(SUMMARY_LENGTH).collect();
    summary.push_str("...");
    summary
}

// =============================================================================
// CHUNK TYPES
// =============================================================================

/// A chunk ready to be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    /// Display title of the owning document, carried into search results.
    pub title: String,
}

/// A stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// A retrieval query scoped to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub user_id: Uuid,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Optional allowlist of documents to search within.
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
}

fn default_top_k() -> usize {
    TOP_K
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            query: query.into(),
            user_id,
            top_k: TOP_K,
            document_ids: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_documents(mut self, document_ids: Vec<Uuid>) -> Self {
        self.document_ids = Some(document_ids);
        self
    }
}

/// A ranked retrieval hit. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub content: String,
    /// Cosine similarity for vector search, match ratio for keyword search.
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CONVERSATION TYPES
// =============================================================================

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// One message of a conversation, also used as a model prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title_from_file_name("report.final.pdf"), "report.final");
        assert_eq!(title_from_file_name("README"), "README");
        assert_eq!(title_from_file_name(".env"), ".env");
    }

    #[test]
    fn test_file_type_from_name() {
        assert_eq!(file_type_from_name("Notes.MD"), "md");
        assert_eq!(file_type_from_name("README"), "txt");
        assert_eq!(file_type_from_name(".bashrc"), "txt");
    }

    #[test]
    fn test_summarize_short_text_unchanged() {
        assert_eq!(summarize("short"), "short");
    }

    #[test]
    fn test_summarize_truncates_by_chars() {
        let text = "字".repeat(SUMMARY_LENGTH + 10);
        let summary = summarize(&text);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), SUMMARY_LENGTH + 3);
    }

    #[test]
    fn test_document_status_round_trip() {
        for status in [
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("indexed".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_role_serde_lowercase() {
        let turn = ConversationTurn::assistant("hi");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_search_request_defaults() {
        let req: SearchRequest =
            serde_json::from_str(r#"{"query":"q","user_id":"00000000-0000-0000-0000-000000000000"}"#)
                .unwrap();
        assert_eq!(req.top_k, TOP_K);
        assert!(req.document_ids.is_none());
    }
}
