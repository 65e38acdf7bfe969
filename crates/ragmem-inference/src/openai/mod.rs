//! Backend for providers that speak the OpenAI wire format.
//!
//! Defaults point at DashScope compatible mode (`text-embedding-v2`,
//! `qwen-plus`). Any other `/v1` endpoint works once `OPENAI_BASE_URL`,
//! the model names and `OPENAI_EMBED_DIM` are set to match it.
//!
//! ```rust,no_run
//! use ragmem_core::{ConversationTurn, GenerationBackend};
//! use ragmem_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! # async fn run() -> ragmem_core::Result<()> {
//! let backend = OpenAIBackend::new(OpenAIConfig {
//!     api_key: Some("sk-...".to_string()),
//!     ..Default::default()
//! })?;
//! let reply = backend
//!     .complete(&[ConversationTurn::user("Summarize our leave policy")], 0.7)
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_ragmem_error, OpenAIErrorCode, Operation};
pub use types::*;
