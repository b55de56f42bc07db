//! Structured logging field name constants for curio.
//!
//! All crates use these constants for consistent structured logging fields.
//! Log aggregation can then query by the same field names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Failed item, failed compensation, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown, batch and saga completion) |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-candidate iteration (label scores, fused hits) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "content", "search", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "hybrid_search", "label_matcher", "ollama", "pool", "saga"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "embed_texts", "create", "process_batch"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Content item UUID being operated on.
pub const CONTENT_ID: &str = "content_id";

/// Content type tag ("image", "text", "file", "url").
pub const CONTENT_TYPE: &str = "content_type";

/// User UUID the operation is scoped to.
pub const USER_ID: &str = "user_id";

/// Label UUID.
pub const LABEL_ID: &str = "label_id";

/// Blob store object key.
pub const OBJECT_KEY: &str = "object_key";

/// Search query text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Byte length of a prompt or response.
pub const PROMPT_LEN: &str = "prompt_len";

// ─── Search-specific fields ────────────────────────────────────────────────

/// Number of lexical results before fusion.
pub const FTS_HITS: &str = "fts_hits";

/// Number of semantic results before fusion.
pub const SEMANTIC_HITS: &str = "semantic_hits";

/// Lexical weight used in hybrid search.
pub const TEXT_WEIGHT: &str = "text_weight";

// ─── Batch-specific fields ─────────────────────────────────────────────────

/// Items that completed enrichment in a batch.
pub const PROCESSED: &str = "processed";

/// Items that failed enrichment in a batch.
pub const FAILED: &str = "failed";

/// Concurrency cap of a batch run.
pub const MAX_CONCURRENCY: &str = "max_concurrency";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_snake_case() {
        for field in [
            SUBSYSTEM,
            COMPONENT,
            OPERATION,
            CONTENT_ID,
            CONTENT_TYPE,
            USER_ID,
            LABEL_ID,
            OBJECT_KEY,
            QUERY,
            DURATION_MS,
            RESULT_COUNT,
            INPUT_COUNT,
            PROMPT_LEN,
            FTS_HITS,
            SEMANTIC_HITS,
            TEXT_WEIGHT,
            PROCESSED,
            FAILED,
            MAX_CONCURRENCY,
        ] {
            assert!(
                field.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{field} is not snake_case"
            );
        }
    }
}
