//! # ragmem-jobs
//!
//! Document extraction and background ingestion for ragmem.
//!
//! This crate provides:
//! - An [`ExtractionRegistry`] dispatching on file extension to text, PDF,
//!   docx, and xlsx adapters
//! - The [`IngestionPipeline`]: extract, chunk, index, record status
//! - A concurrent [`IngestionWorker`] with an event stream and graceful drain
//!
//! ## Example
//!
//! ```ignore
//! use ragmem_jobs::{ExtractionRegistry, IngestionPipeline, IngestionWorker, WorkerConfig};
//!
//! let pipeline = IngestionPipeline::new(documents, Arc::new(ExtractionRegistry::with_defaults()), chunker, index);
//! let handle = IngestionWorker::new(Arc::new(pipeline), WorkerConfig::from_env()?)
//!     .with_maintenance(memory_store)
//!     .start();
//!
//! let mut events = handle.events();
//! handle.submit(document).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod adapters;
pub mod extraction;
pub mod maintenance;
pub mod pipeline;
pub mod worker;

// Re-export core types
pub use ragmem_core::*;

pub use adapters::{PandocAdapter, PdfTextAdapter, SpreadsheetAdapter, TextNativeAdapter};
pub use extraction::ExtractionRegistry;
pub use maintenance::PeriodicTask;
pub use pipeline::{IngestOutcome, IngestionPipeline};
pub use worker::{IngestEvent, IngestionWorker, WorkerConfig, WorkerHandle};
