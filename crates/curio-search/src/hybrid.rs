//! Hybrid search combining full-text and semantic vector search.
//!
//! Short queries run both searches concurrently and fuse them with a linear
//! weighting: the lexical side contributes a rank-based score and the
//! semantic side its cosine similarity. Long queries read more like a
//! description than keywords, so they go straight to vector search.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use curio_core::defaults::{SEARCH_LIMIT, SEARCH_LONG_QUERY_WORDS, SEARCH_TEXT_WEIGHT};
use curio_core::{
    count_words, ContentItem, ContentRepository, ContentType, EmbeddingBackend, Error, Result,
    ScoredContent,
};

/// Configuration for hybrid search.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchConfig {
    /// Maximum number of hits returned (and fetched from each side).
    pub limit: usize,
    /// Weight of the lexical score (0.0 to 1.0); the semantic score gets the rest.
    pub text_weight: f32,
    /// Queries with more words than this skip lexical search.
    pub long_query_words: usize,
    /// Restrict results to one content type.
    pub content_type: Option<ContentType>,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            limit: SEARCH_LIMIT,
            text_weight: SEARCH_TEXT_WEIGHT,
            long_query_words: SEARCH_LONG_QUERY_WORDS,
            content_type: None,
        }
    }
}

impl HybridSearchConfig {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_text_weight(mut self, weight: f32) -> Self {
        self.text_weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_long_query_words(mut self, words: usize) -> Self {
        self.long_query_words = words;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }
}

/// Which searches produced the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Lexical and vector search, fused.
    Hybrid,
    /// Vector search only (long query).
    VectorOnly,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub item: ContentItem,
    /// Rank-based lexical score, 0 when the item had no lexical hit.
    pub text_score: f32,
    /// Cosine similarity, 0 when the item had no vector hit.
    pub vector_score: f32,
    pub score: f32,
}

/// Search results plus metadata about the search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub strategy: SearchStrategy,
    pub fts_hits: usize,
    pub semantic_hits: usize,
    pub search_time_ms: u64,
}

/// Hybrid search engine implementation.
#[derive(Clone)]
pub struct HybridSearchEngine {
    contents: Arc<dyn ContentRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl HybridSearchEngine {
    /// Create a new hybrid search engine.
    pub fn new(contents: Arc<dyn ContentRepository>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { contents, embedder }
    }

    /// Search the items visible to `user`, best first.
    pub async fn search(
        &self,
        query: &str,
        user: Uuid,
        config: &HybridSearchConfig,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.search_with_metadata(query, user, config).await?.hits)
    }

    /// Search and report strategy, per-side hit counts and timing.
    #[instrument(skip(self, query, config), fields(subsystem = "search", component = "hybrid", op = "search", user_id = %user, limit = config.limit))]
    pub async fn search_with_metadata(
        &self,
        query: &str,
        user: Uuid,
        config: &HybridSearchConfig,
    ) -> Result<SearchResponse> {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query must not be empty".to_string()));
        }

        let vector = self.embedder.embed_text(query).await?;
        let limit = config.limit.max(1) as i64;

        let (strategy, hits, fts_hits, semantic_hits) =
            if count_words(query) > config.long_query_words {
                let semantic = self
                    .contents
                    .vector_search(&vector, user, config.content_type, limit)
                    .await?;
                let semantic_hits = semantic.len();
                let hits = semantic
                    .into_iter()
                    .map(|s| SearchHit {
                        item: s.item.without_vector(),
                        text_score: 0.0,
                        vector_score: finite_or_zero(s.score),
                        score: finite_or_zero(s.score),
                    })
                    .take(config.limit)
                    .collect();
                (SearchStrategy::VectorOnly, hits, 0, semantic_hits)
            } else {
                let (text, semantic) = tokio::try_join!(
                    self.contents
                        .full_text_search(query, user, config.content_type, limit),
                    self.contents
                        .vector_search(&vector, user, config.content_type, limit),
                )?;
                let (fts_hits, semantic_hits) = (text.len(), semantic.len());
                let hits = fuse(text, semantic, config.text_weight, config.limit);
                (SearchStrategy::Hybrid, hits, fts_hits, semantic_hits)
            };

        let search_time_ms = start.elapsed().as_millis() as u64;
        debug!(fts_hits, semantic_hits, ?strategy, "Search sides complete");
        info!(
            result_count = hits.len(),
            duration_ms = search_time_ms,
            "Search complete"
        );

        Ok(SearchResponse {
            hits,
            strategy,
            fts_hits,
            semantic_hits,
            search_time_ms,
        })
    }
}

/// Similarity against a zero-norm vector is undefined; it counts as no match.
fn finite_or_zero(score: f32) -> f32 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Fuse lexical and semantic hit lists.
///
/// The lexical hit at 0-based rank `r` of `n` scores `1 - r/n`; the semantic
/// score is the similarity, with non-finite values read as 0. The fused score is
/// `text_weight * text + (1 - text_weight) * vector`. Ties keep the order in
/// which items were first seen, lexical list first.
pub fn fuse(
    text: Vec<ScoredContent>,
    semantic: Vec<ScoredContent>,
    text_weight: f32,
    limit: usize,
) -> Vec<SearchHit> {
    let weight = text_weight.clamp(0.0, 1.0);
    let total = text.len() as f32;
    let mut order: Vec<Uuid> = Vec::new();
    let mut merged: HashMap<Uuid, SearchHit> = HashMap::new();

    for (rank, hit) in text.into_iter().enumerate() {
        let id = hit.item.id;
        if merged.contains_key(&id) {
            continue;
        }
        order.push(id);
        merged.insert(
            id,
            SearchHit {
                item: hit.item.without_vector(),
                text_score: 1.0 - rank as f32 / total,
                vector_score: 0.0,
                score: 0.0,
            },
        );
    }
    for hit in semantic {
        let id = hit.item.id;
        match merged.get_mut(&id) {
            Some(existing) => {
                existing.vector_score = existing.vector_score.max(finite_or_zero(hit.score))
            }
            None => {
                order.push(id);
                merged.insert(
                    id,
                    SearchHit {
                        item: hit.item.without_vector(),
                        text_score: 0.0,
                        vector_score: finite_or_zero(hit.score),
                        score: 0.0,
                    },
                );
            }
        }
    }

    let mut hits: Vec<SearchHit> = order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .map(|mut hit| {
            hit.score = weight * hit.text_score + (1.0 - weight) * hit.vector_score;
            hit
        })
        .collect();
    // sort_by is stable
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}
