//! # curio-search
//!
//! Label matching and hybrid search for curio.
//!
//! This crate provides:
//! - Label creation with embedding, duplicate and length checks
//! - Three-tier label matching (exclude, include, similarity) with
//!   cold-start bootstrap from candidate tags
//! - Hybrid search fusing PostgreSQL full-text and pgvector results
//!
//! Both engines work against the capability traits in `curio-core`, so they
//! run unchanged over PostgreSQL or the in-memory store.

pub mod hybrid;
pub mod labels;

pub use hybrid::{
    fuse, HybridSearchConfig, HybridSearchEngine, SearchHit, SearchResponse, SearchStrategy,
};
pub use labels::{rank_labels, LabelMatcher, LabelService};
