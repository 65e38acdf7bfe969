//! # ragmem-core
//!
//! Core types, traits, and abstractions for ragmem, a retrieval-and-memory
//! pipeline for document question answering.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other ragmem crates depend on.

pub mod defaults;
pub mod env;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use traits::*;
