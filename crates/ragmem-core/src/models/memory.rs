//! Long-term memory models.
//!
//! A memory is a durable, importance-scored fact owned by one user. Its
//! expiry is a pure function of importance (see [`expiry_days`]) and it is
//! never physically deleted: deactivation flips `is_active`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{
    MEMORY_CATEGORY_DEFAULT, MEMORY_CATEGORY_MAX, MEMORY_CONTENT_MAX, MEMORY_IMPORTANCE_DEFAULT,
    MEMORY_RETRIEVE_LIMIT,
};
use crate::{Error, Result};

// =============================================================================
// MEMORY TYPES
// =============================================================================

/// Where a memory came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    #[default]
    Manual,
    Extracted,
    System,
}

impl std::fmt::Display for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Extracted => write!(f, "extracted"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MemorySource {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "extracted" => Ok(Self::Extracted),
            "system" => Ok(Self::System),
            _ => Err(format!("Invalid memory source: {}", s)),
        }
    }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    /// In [0, 1]; drives expiry banding and retrieval order.
    pub importance: f32,
    pub category: String,
    pub tags: Vec<String>,
    pub source: MemorySource,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    /// `None` means the memory never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// True when the memory is active and its expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_some_and(|at| at < now)
    }
}

/// Input for creating a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    #[serde(default = "default_importance")]
    pub importance: f32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: MemorySource,
}

fn default_importance() -> f32 {
    MEMORY_IMPORTANCE_DEFAULT
}

impl NewMemory {
    pub fn new(content: impl Into<String>, importance: f32) -> Self {
        Self {
            content: content.into(),
            importance,
            category: None,
            tags: Vec::new(),
            source: MemorySource::Manual,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.source = source;
        self
    }

    /// Category to persist, falling back to the default label.
    pub fn category_or_default(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => MEMORY_CATEGORY_DEFAULT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_content(&self.content)?;
        validate_importance(self.importance)?;
        if let Some(category) = &self.category {
            validate_category(category)?;
        }
        Ok(())
    }
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub importance: Option<f32>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.importance.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.is_active.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        if let Some(importance) = self.importance {
            validate_importance(importance)?;
        }
        if let Some(category) = &self.category {
            validate_category(category)?;
        }
        Ok(())
    }
}

/// Filter for memory retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Whitespace-delimited tokens; content must contain at least one.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_importance: f32,
    #[serde(default = "default_retrieve_limit")]
    pub limit: usize,
}

fn default_retrieve_limit() -> usize {
    MEMORY_RETRIEVE_LIMIT
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            min_importance: 0.0,
            limit: MEMORY_RETRIEVE_LIMIT,
        }
    }
}

impl MemoryQuery {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_min_importance(mut self, min_importance: f32) -> Self {
        self.min_importance = min_importance;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Lowercased query tokens. Empty when no query was given.
    pub fn tokens(&self) -> Vec<String> {
        self.query.as_deref().map(query_tokens).unwrap_or_default()
    }

    /// Whether `memory` passes every filter except ownership.
    pub fn matches(&self, memory: &Memory) -> bool {
        if !memory.is_active || memory.importance < self.min_importance {
            return false;
        }
        if let Some(category) = &self.category {
            if &memory.category != category {
                return false;
            }
        }
        let tokens = self.tokens();
        tokens.is_empty() || content_contains_any(&memory.content, &tokens)
    }
}

// =============================================================================
// EXPIRY BANDING
// =============================================================================

/// Days until a memory of the given importance expires.
///
/// | importance | days  |
/// |------------|-------|
/// | > 0.9      | 180   |
/// | > 0.8      | 90    |
/// | > 0.7      | 30    |
/// | > 0.6      | 7     |
/// | otherwise  | never |
pub fn expiry_days(importance: f32) -> Option<i64> {
    if importance > 0.9 {
        Some(180)
    } else if importance > 0.8 {
        Some(90)
    } else if importance > 0.7 {
        Some(30)
    } else if importance > 0.6 {
        Some(7)
    } else {
        None
    }
}

/// Absolute expiry for a memory created at `from`.
pub fn expires_at_for(importance: f32, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expiry_days(importance).map(|days| from + Duration::days(days))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Split a memory query into lowercased whitespace tokens.
pub fn query_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

/// Case-insensitive OR containment over `tokens`.
pub fn content_contains_any(content: &str, tokens: &[String]) -> bool {
    let haystack = content.to_lowercase();
    tokens.iter().any(|t| haystack.contains(t.as_str()))
}

/// Parse a comma-separated tag string, dropping blanks.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::InvalidInput("memory content is empty".to_string()));
    }
    let len = content.chars().count();
    if len > MEMORY_CONTENT_MAX {
        return Err(Error::InvalidInput(format!(
            "memory content is {} chars, max {}",
            len, MEMORY_CONTENT_MAX
        )));
    }
    Ok(())
}

fn validate_importance(importance: f32) -> Result<()> {
    if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
        return Err(Error::InvalidInput(format!(
            "importance must be within [0, 1], got {}",
            importance
        )));
    }
    Ok(())
}

fn validate_category(category: &str) -> Result<()> {
    if category.chars().count() > MEMORY_CATEGORY_MAX {
        return Err(Error::InvalidInput(format!(
            "category exceeds {} chars",
            MEMORY_CATEGORY_MAX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(importance: f32, category: &str, content: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: Uuid::now_v7(),
            user_id: Uuid::nil(),
            content: content.to_string(),
            importance,
            category: category.to_string(),
            tags: vec![],
            source: MemorySource::Manual,
            access_count: 0,
            last_accessed: None,
            expires_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    // =========================================================================
    // Expiry banding
    // =========================================================================

    #[test]
    fn test_expiry_bands() {
        assert_eq!(expiry_days(0.95), Some(180));
        assert_eq!(expiry_days(0.85), Some(90));
        assert_eq!(expiry_days(0.75), Some(30));
        assert_eq!(expiry_days(0.65), Some(7));
        assert_eq!(expiry_days(0.5), None);
    }

    #[test]
    fn test_expiry_band_edges_are_exclusive() {
        assert_eq!(expiry_days(0.9), Some(90));
        assert_eq!(expiry_days(0.8), Some(30));
        assert_eq!(expiry_days(0.7), Some(7));
        assert_eq!(expiry_days(0.6), None);
        assert_eq!(expiry_days(1.0), Some(180));
        assert_eq!(expiry_days(0.0), None);
    }

    #[test]
    fn test_expiry_monotonic_above_threshold() {
        let samples: Vec<f32> = (61..=100).map(|i| i as f32 / 100.0).collect();
        for pair in samples.windows(2) {
            let a = expiry_days(pair[0]).unwrap();
            let b = expiry_days(pair[1]).unwrap();
            assert!(a <= b, "{} -> {} but {} -> {}", pair[0], a, pair[1], b);
        }
    }

    #[test]
    fn test_expires_at_for_high_importance() {
        let now = Utc::now();
        let at = expires_at_for(0.95, now).unwrap();
        assert_eq!(at - now, Duration::days(180));
        assert!(expires_at_for(0.3, now).is_none());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_new_memory_validation() {
        assert!(NewMemory::new("likes tea", 0.5).validate().is_ok());
        assert!(NewMemory::new("   ", 0.5).validate().is_err());
        assert!(NewMemory::new("x", 1.5).validate().is_err());
        assert!(NewMemory::new("x", f32::NAN).validate().is_err());
        assert!(NewMemory::new("x".repeat(MEMORY_CONTENT_MAX + 1), 0.5)
            .validate()
            .is_err());
        assert!(NewMemory::new("x", 0.5)
            .with_category("c".repeat(MEMORY_CATEGORY_MAX + 1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_category_default() {
        assert_eq!(NewMemory::new("x", 0.5).category_or_default(), "general");
        assert_eq!(
            NewMemory::new("x", 0.5)
                .with_category("  ")
                .category_or_default(),
            "general"
        );
        assert_eq!(
            NewMemory::new("x", 0.5)
                .with_category("work")
                .category_or_default(),
            "work"
        );
    }

    #[test]
    fn test_update_is_empty() {
        assert!(MemoryUpdate::default().is_empty());
        let update = MemoryUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    // =========================================================================
    // Query matching
    // =========================================================================

    #[test]
    fn test_query_matches_any_token() {
        let m = memory(0.5, "general", "Prefers green tea in the morning");
        let q = MemoryQuery::default().with_query("coffee TEA");
        assert!(q.matches(&m));
        let q = MemoryQuery::default().with_query("coffee juice");
        assert!(!q.matches(&m));
    }

    #[test]
    fn test_query_filters_importance_and_category() {
        let m = memory(0.5, "work", "standup at nine");
        assert!(!MemoryQuery::default().with_min_importance(0.7).matches(&m));
        assert!(!MemoryQuery::default().with_category("home").matches(&m));
        assert!(MemoryQuery::default().with_category("work").matches(&m));
    }

    #[test]
    fn test_query_excludes_inactive() {
        let mut m = memory(0.9, "general", "anything");
        m.is_active = false;
        assert!(!MemoryQuery::default().matches(&m));
    }

    #[test]
    fn test_is_expired_at() {
        let now = Utc::now();
        let mut m = memory(0.7, "general", "x");
        assert!(!m.is_expired_at(now));
        m.expires_at = Some(now - Duration::seconds(1));
        assert!(m.is_expired_at(now));
        m.is_active = false;
        assert!(!m.is_expired_at(now));
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_memory_source_round_trip() {
        assert_eq!("Extracted".parse::<MemorySource>().unwrap(), MemorySource::Extracted);
        assert_eq!(MemorySource::System.to_string(), "system");
        assert!("bogus".parse::<MemorySource>().is_err());
    }
}
