//! # ragmem-inference
//!
//! Embedding and chat-completion backends for ragmem.
//!
//! This crate provides:
//! - OpenAI-compatible implementation (default, feature `openai`), with
//!   DashScope compatible-mode defaults
//! - Deterministic mock backend (feature `mock`) for tests in dependent crates
//! - Sentinel helpers that turn provider failures into all-zero vectors
//!
//! # Feature Flags
//!
//! - `openai` (default): Enable the OpenAI-compatible backend
//! - `mock`: Enable `MockInferenceBackend`
//!
//! # Example
//!
//! ```rust,no_run
//! use ragmem_inference::OpenAIBackend;
//! use ragmem_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let texts = vec!["Hello".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod sentinel;

#[cfg(feature = "openai")]
pub mod openai;

// Mock inference backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use ragmem_core::*;

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::{hashed_embedding, MockCall, MockInferenceBackend};

pub use sentinel::{embed_or_sentinel, is_sentinel, sentinel_vector};
