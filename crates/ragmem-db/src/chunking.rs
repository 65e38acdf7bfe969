//! Boundary-aware document chunking.
//!
//! `TextChunker` scans text in windows of `max_chunk_size` characters. When a
//! window would end mid-text it backtracks to the last sentence terminator
//! (`。`, `！`, `？`, or a newline) inside the window, provided that point lies
//! past the window's midpoint; otherwise it cuts at the hard window edge. The
//! next window starts `overlap` characters before the previous end, so
//! neighbouring chunks share exactly `overlap` characters.
//!
//! Whitespace-only chunks are dropped, and a non-final chunk shorter than
//! `min_chunk_size` is folded into its predecessor. Output is a pure function
//! of the input and the configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragmem_db::chunking::{Chunker, ChunkerConfig, TextChunker};
//!
//! let chunker = TextChunker::new(ChunkerConfig::default());
//! for chunk in chunker.chunk(&extracted_text) {
//!     println!("{}..{}: {}", chunk.start_offset, chunk.end_offset, chunk.text);
//! }
//! ```

use std::collections::HashMap;

use ragmem_core::defaults::CHUNK_BOUNDARIES;

/// Configuration for chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Target size of a chunk in characters.
    pub max_chunk_size: usize,
    /// Minimum size of a non-final chunk in characters (smaller ones are merged).
    pub min_chunk_size: usize,
    /// Number of characters shared by adjacent chunks.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: ragmem_core::defaults::CHUNK_SIZE,
            min_chunk_size: ragmem_core::defaults::CHUNK_MIN_SIZE,
            overlap: ragmem_core::defaults::CHUNK_OVERLAP,
        }
    }
}

impl ChunkerConfig {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            max_chunk_size,
            overlap,
            ..Default::default()
        }
    }

    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }
}

/// How a chunk's end was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Backtracked to a sentence terminator.
    Sentence,
    /// No terminator past the midpoint; cut at the window edge.
    Hard,
    /// Reached the end of the text.
    End,
}

impl Boundary {
    fn as_str(self) -> &'static str {
        match self {
            Boundary::Sentence => "sentence",
            Boundary::Hard => "hard",
            Boundary::End => "end",
        }
    }
}

/// A text chunk with position information and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Starting byte offset in the original document.
    pub start_offset: usize,
    /// Ending byte offset in the original document.
    pub end_offset: usize,
    /// Additional metadata about the chunk (e.g. `boundary`).
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Create a new chunk with empty metadata.
    pub fn new(text: String, start_offset: usize, end_offset: usize) -> Self {
        Self {
            text,
            start_offset,
            end_offset,
            metadata: HashMap::new(),
        }
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The boundary kind recorded when the chunk was cut.
    pub fn boundary(&self) -> Option<&str> {
        self.metadata.get("boundary").map(String::as_str)
    }
}

/// Common trait for chunking strategies.
pub trait Chunker: Send + Sync {
    /// Chunk the given text into a list of chunks.
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// Get the configuration used by this chunker.
    fn config(&self) -> &ChunkerConfig;
}

/// Sliding-window chunker that prefers sentence boundaries.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl TextChunker {
    /// Create a new TextChunker. A zero window size is raised to 1.
    pub fn new(mut config: ChunkerConfig) -> Self {
        config.max_chunk_size = config.max_chunk_size.max(1);
        Self { config }
    }

    /// Window spans in char indices, before filtering and merging.
    fn windows(&self, chars: &[char]) -> Vec<(usize, usize, Boundary)> {
        let size = self.config.max_chunk_size;
        let len = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < len {
            let window_end = (start + size).min(len);
            let (end, boundary) = if window_end == len {
                (len, Boundary::End)
            } else {
                let midpoint = start + size / 2;
                match (start..window_end)
                    .rev()
                    .find(|&i| CHUNK_BOUNDARIES.contains(&chars[i]))
                {
                    Some(i) if i + 1 > midpoint => (i + 1, Boundary::Sentence),
                    _ => (window_end, Boundary::Hard),
                }
            };
            spans.push((start, end, boundary));

            if end >= len {
                break;
            }

            // Prevent infinite loop when overlap swallows the window
            let next = end.saturating_sub(self.config.overlap);
            start = if next > start { next } else { start + 1 };
        }

        spans
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return vec![];
        }

        let chars: Vec<char> = text.chars().collect();
        // Byte offset of every char index, plus the end of the text
        let mut byte_at: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_at.push(text.len());

        let spans: Vec<_> = self
            .windows(&chars)
            .into_iter()
            .filter(|&(s, e, _)| chars[s..e].iter().any(|c| !c.is_whitespace()))
            .collect();

        let mut merged: Vec<(usize, usize, Boundary)> = Vec::with_capacity(spans.len());
        let mut carry_start: Option<usize> = None;
        let last = spans.len().saturating_sub(1);

        for (i, &(s, e, boundary)) in spans.iter().enumerate() {
            let s = carry_start.take().map_or(s, |c| c.min(s));
            if e - s < self.config.min_chunk_size && i != last {
                match merged.last_mut() {
                    Some(prev) => {
                        prev.1 = prev.1.max(e);
                        prev.2 = boundary;
                    }
                    None => carry_start = Some(s),
                }
                continue;
            }
            merged.push((s, e, boundary));
        }

        merged
            .into_iter()
            .map(|(s, e, boundary)| {
                let start = byte_at[s];
                let end = byte_at[e];
                let mut chunk = Chunk::new(text[start..end].to_string(), start, end);
                chunk
                    .metadata
                    .insert("boundary".to_string(), boundary.as_str().to_string());
                chunk
            })
            .collect()
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}

/// Chunk `text` into plain strings with the default minimum size.
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    TextChunker::new(ChunkerConfig::new(target_size, overlap))
        .chunk(text)
        .into_iter()
        .map(|c| c.text)
        .collect()
}
