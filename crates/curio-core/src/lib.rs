//! # curio-core
//!
//! Core types, traits, and abstractions for curio.
//!
//! This crate provides the data model shared by every other crate, the
//! capability traits (document store, blob store, inference, group
//! resolution), the similarity engine, and text utilities.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod similarity;
pub mod text;
pub mod traits;

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use similarity::{categorize, cosine_similarity, Categorized, SimilarityThresholds};
pub use text::{count_words, extract_urls, is_pure_urls, remove_urls};
pub use traits::*;
