//! # ragmem-service
//!
//! The query-time half of ragmem and the wiring that holds it together.
//!
//! This crate provides:
//! - [`MemoryStore`]: per-user memories with importance-banded expiry
//! - [`assemble`] and [`build_messages`]: pure context and prompt construction
//! - [`ChatOrchestrator`]: retrieve, assemble, generate, degrading instead of failing
//! - [`DocumentService`]: upload registration with hash dedup, listing, deletion
//! - [`AppConfig`], [`init_tracing`], and [`RagApp`] for binaries
//!
//! ## Example
//!
//! ```ignore
//! use ragmem_service::{AppConfig, ChatRequest, RagApp};
//!
//! let app = RagApp::build(AppConfig::load()?).await?;
//! let request = ChatRequest::new(user_id, "How many vacation days do I get?");
//! request.validate()?;
//! let reply = app.chat.converse(&request).await;
//! println!("{}", reply.reply);
//! app.shutdown().await?;
//! ```

pub mod app;
pub mod config;
pub mod context;
pub mod documents;
pub mod memory_store;
pub mod orchestrator;
pub mod telemetry;

// Re-export core types
pub use ragmem_core::*;

pub use app::RagApp;
pub use config::{AppConfig, InferenceKind};
pub use context::{assemble, build_messages, truncate_history, AssembledContext, Source};
pub use documents::{hash_file, DocumentService, UploadSettings, UploadedFile};
pub use memory_store::MemoryStore;
pub use orchestrator::{apology, ChatOrchestrator, ChatReply, ChatRequest, ChatSettings, ChatStage};
pub use telemetry::{init_tracing, LogConfig, LogFormat};
