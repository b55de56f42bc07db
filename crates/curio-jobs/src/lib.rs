//! # curio-jobs
//!
//! Background enrichment for curio.
//!
//! This crate provides:
//! - A batch pipeline that describes, labels and marks unprocessed content
//! - A periodic worker running one batch per content type, with events
//! - The `curio-worker` binary wiring PostgreSQL, blob storage and Ollama
//!
//! ## Example
//!
//! ```ignore
//! use curio_jobs::{BatchProcessor, BatchWorker, WorkerConfig};
//!
//! let processor = BatchProcessor::new(matcher);
//! let handle = BatchWorker::new(&services, processor, WorkerConfig::from_env()).start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod pipeline;
pub mod worker;

pub use pipeline::{BatchProcessor, PipelineConfig};
pub use worker::{BatchWorker, WorkerConfig, WorkerEvent, WorkerHandle};
