//! Vector similarity and threshold bucketing.

use tracing::warn;

use crate::defaults::{LABEL_HIGH_THRESHOLD, LABEL_LOW_THRESHOLD, LABEL_LOW_THRESHOLD_LEGACY};
use crate::{Error, Result};

/// Cosine similarity of two equal-length vectors.
///
/// Returns `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// High/low similarity cut-offs for [`categorize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityThresholds {
    /// Strictly above this is a high match.
    pub high: f32,
    /// Strictly above this (and not high) is a low match.
    pub low: f32,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            high: LABEL_HIGH_THRESHOLD,
            low: LABEL_LOW_THRESHOLD,
        }
    }
}

impl SimilarityThresholds {
    /// The 0.70 / 0.20 pair used by older label matching.
    pub const LEGACY: SimilarityThresholds = SimilarityThresholds {
        high: LABEL_HIGH_THRESHOLD,
        low: LABEL_LOW_THRESHOLD_LEGACY,
    };

    pub fn new(high: f32, low: f32) -> Self {
        Self { high, low }
    }

    /// Read `CURIO_LABEL_HIGH_THRESHOLD` / `CURIO_LABEL_LOW_THRESHOLD`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: f32| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(fallback)
        };
        Self {
            high: read(crate::defaults::ENV_LABEL_HIGH_THRESHOLD, defaults.high),
            low: read(crate::defaults::ENV_LABEL_LOW_THRESHOLD, defaults.low),
        }
    }
}

/// Candidates split into high and low similarity buckets.
///
/// Each bucket holds `(candidate, similarity)` sorted by similarity
/// descending; equal scores keep their input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorized<T> {
    pub high: Vec<(T, f32)>,
    pub low: Vec<(T, f32)>,
}

impl<T> Default for Categorized<T> {
    fn default() -> Self {
        Self {
            high: Vec::new(),
            low: Vec::new(),
        }
    }
}

/// Partition `candidates` by similarity of `vector_of(candidate)` to `query`.
///
/// A candidate whose vector length differs from the query cannot be scored
/// and is dropped along with the below-threshold ones.
pub fn categorize<T, F>(
    candidates: impl IntoIterator<Item = T>,
    query: &[f32],
    thresholds: SimilarityThresholds,
    vector_of: F,
) -> Categorized<T>
where
    F: Fn(&T) -> &[f32],
{
    let mut out = Categorized::default();

    for candidate in candidates {
        let similarity = match cosine_similarity(query, vector_of(&candidate)) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Skipping candidate with incompatible vector");
                continue;
            }
        };

        if similarity > thresholds.high {
            out.high.push((candidate, similarity));
        } else if similarity > thresholds.low {
            out.low.push((candidate, similarity));
        }
    }

    // sort_by is stable
    out.high.sort_by(|a, b| b.1.total_cmp(&a.1));
    out.low.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
}
