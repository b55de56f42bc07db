//! Centralized default constants for curio.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model used for text analysis.
pub const GEN_MODEL: &str = "qwen2.5:7b";

/// Default vision model used for image analysis and OCR.
pub const VISION_MODEL: &str = "qwen2.5vl:7b";

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Number of keywords requested from content analysis.
pub const ANALYSIS_KEYWORDS: usize = 5;

/// Approximate summary length requested from content analysis (words).
pub const ANALYSIS_SUMMARY_WORDS: usize = 100;

/// Maximum characters of extracted file text sent for analysis.
pub const ANALYSIS_MAX_CHARS: usize = 10_000;

// =============================================================================
// LABELS
// =============================================================================

/// Similarity above which a label is a high-priority match.
pub const LABEL_HIGH_THRESHOLD: f32 = 0.70;

/// Similarity above which a label is a low-priority match.
pub const LABEL_LOW_THRESHOLD: f32 = 0.25;

/// Earlier low threshold, kept selectable through configuration.
pub const LABEL_LOW_THRESHOLD_LEGACY: f32 = 0.20;

/// Maximum labels assigned to one content item per user.
pub const LABEL_MAX_MATCHES: usize = 5;

/// Maximum labels created by the cold-start bootstrap.
pub const LABEL_BOOTSTRAP_MAX: usize = 3;

/// Maximum label name length (characters).
pub const LABEL_NAME_MAX_CHARS: usize = 30;

/// Maximum label description length (characters).
pub const LABEL_DESCRIPTION_MAX_CHARS: usize = 200;

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Texts with fewer words than this skip summarization.
pub const SHORT_TEXT_WORDS: usize = 200;

/// Default concurrency cap for a batch run.
pub const BATCH_MAX_CONCURRENCY: usize = 5;

/// Default timeout for one whole batch run (seconds).
pub const BATCH_TIMEOUT_SECS: u64 = 1800;

/// Default worker polling interval (milliseconds).
pub const POLL_INTERVAL_MS: u64 = 30_000;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Timeout for external extraction commands (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 120;

/// Timeout for link preview requests (seconds).
pub const PREVIEW_TIMEOUT_SECS: u64 = 10;

/// Maximum characters kept from a fallback preview paragraph.
pub const PREVIEW_SNIPPET_CHARS: usize = 200;

// =============================================================================
// SEARCH
// =============================================================================

/// Default number of search results.
pub const SEARCH_LIMIT: usize = 10;

/// Default lexical weight in hybrid fusion (vector weight is `1 - w`).
pub const SEARCH_TEXT_WEIGHT: f32 = 0.7;

/// Queries longer than this many words use vector search only.
pub const SEARCH_LONG_QUERY_WORDS: usize = 10;

// =============================================================================
// STORAGE
// =============================================================================

/// Default root directory for the filesystem blob store.
pub const BLOB_ROOT: &str = "./data/blobs";

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BLOB_ROOT: &str = "CURIO_BLOB_ROOT";
pub const ENV_BLOB_BASE_URL: &str = "CURIO_BLOB_BASE_URL";
pub const ENV_OLLAMA_BASE: &str = "OLLAMA_BASE";
pub const ENV_OLLAMA_EMBED_MODEL: &str = "OLLAMA_EMBED_MODEL";
pub const ENV_OLLAMA_GEN_MODEL: &str = "OLLAMA_GEN_MODEL";
pub const ENV_OLLAMA_VISION_MODEL: &str = "OLLAMA_VISION_MODEL";
pub const ENV_OLLAMA_EMBED_DIM: &str = "OLLAMA_EMBED_DIM";
pub const ENV_LABEL_HIGH_THRESHOLD: &str = "CURIO_LABEL_HIGH_THRESHOLD";
pub const ENV_LABEL_LOW_THRESHOLD: &str = "CURIO_LABEL_LOW_THRESHOLD";
pub const ENV_BATCH_CONCURRENCY: &str = "CURIO_BATCH_CONCURRENCY";
pub const ENV_BATCH_TIMEOUT_SECS: &str = "CURIO_BATCH_TIMEOUT_SECS";
pub const ENV_POLL_INTERVAL_MS: &str = "CURIO_POLL_INTERVAL_MS";
pub const ENV_WORKER_ENABLED: &str = "CURIO_WORKER_ENABLED";
pub const ENV_ANALYSIS_LANGUAGE: &str = "CURIO_ANALYSIS_LANGUAGE";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_thresholds_are_ordered() {
        assert!(LABEL_LOW_THRESHOLD < LABEL_HIGH_THRESHOLD);
        assert!(LABEL_LOW_THRESHOLD_LEGACY < LABEL_LOW_THRESHOLD);
    }

    #[test]
    fn test_search_weight_in_unit_range() {
        assert!((0.0..=1.0).contains(&SEARCH_TEXT_WEIGHT));
    }

    #[test]
    fn test_bootstrap_never_exceeds_match_cap() {
        assert!(LABEL_BOOTSTRAP_MAX <= LABEL_MAX_MATCHES);
    }
}
