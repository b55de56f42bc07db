//! # curio-inference
//!
//! Inference backends for curio: embeddings, content analysis (title,
//! summary, keywords) and OCR.
//!
//! This crate provides:
//! - Ollama implementation (default feature `ollama`)
//! - Bilingual analysis prompts and lenient JSON answer parsing
//! - A deterministic mock backend (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use curio_inference::OllamaBackend;
//! use curio_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let vector = backend.embed_text("Hello").await.unwrap();
//!     println!("{} dims", vector.len());
//! }
//! ```

pub mod prompts;

#[cfg(feature = "ollama")]
pub mod ollama;

// Mock inference backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaBackend, OllamaConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockInferenceBackend;
