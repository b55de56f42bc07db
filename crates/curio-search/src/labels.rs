//! Per-user labels: creation and matching against content.
//!
//! Matching runs in three tiers. Exclude keywords veto a label outright,
//! include keywords admit it regardless of similarity, and the remaining
//! labels are bucketed by vector similarity into high and low matches.
//! When nothing matches, the content's candidate tags bootstrap new labels.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use curio_core::defaults::{
    LABEL_BOOTSTRAP_MAX, LABEL_DESCRIPTION_MAX_CHARS, LABEL_MAX_MATCHES, LABEL_NAME_MAX_CHARS,
};
use curio_core::{
    categorize, CreateLabelOutcome, EmbeddingBackend, Error, Label, LabelRepository, NewLabel,
    Result, SimilarityThresholds,
};

// =============================================================================
// LABEL SERVICE
// =============================================================================

/// Creates, lists and deletes labels.
#[derive(Clone)]
pub struct LabelService {
    labels: Arc<dyn LabelRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl LabelService {
    pub fn new(labels: Arc<dyn LabelRepository>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { labels, embedder }
    }

    /// Create a label for `owner`.
    ///
    /// The name is trimmed. An empty name is invalid input; over-long names
    /// or descriptions and duplicate names are reported through the outcome.
    #[instrument(skip(self, request), fields(subsystem = "search", component = "labels", op = "create_label", user_id = %owner))]
    pub async fn create_label(&self, owner: Uuid, request: NewLabel) -> Result<CreateLabelOutcome> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("label name must not be empty".to_string()));
        }
        let description = request.description.trim();
        if name.chars().count() > LABEL_NAME_MAX_CHARS
            || description.chars().count() > LABEL_DESCRIPTION_MAX_CHARS
        {
            debug!(name, "Label name or description too long");
            return Ok(CreateLabelOutcome::TooLong);
        }
        if self.labels.exists(owner, name).await? {
            debug!(name, "Label already exists");
            return Ok(CreateLabelOutcome::AlreadyExists);
        }

        let embed_input = if description.is_empty() {
            name.to_string()
        } else {
            format!("{}: {}", name, description)
        };
        let vector = self.embedder.embed_text(&embed_input).await?;

        let label = Label {
            id: Uuid::now_v7(),
            owner,
            name: name.to_string(),
            description: description.to_string(),
            vector,
            include_keywords: clean_keywords(request.include_keywords),
            exclude_keywords: clean_keywords(request.exclude_keywords),
            is_deleted: false,
            created_at: Utc::now(),
        };

        // A concurrent creation can still win the race after the check above.
        match self.labels.insert(&label).await {
            Ok(_) => {
                info!(label_id = %label.id, name = %label.name, "Label created");
                Ok(CreateLabelOutcome::Created(label))
            }
            Err(Error::Conflict(_)) => Ok(CreateLabelOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    /// All live labels of `owner`, oldest first.
    pub async fn list_labels(&self, owner: Uuid) -> Result<Vec<Label>> {
        self.labels.list_for_owner(owner).await
    }

    /// Soft-delete one of `owner`'s labels.
    pub async fn delete_label(&self, owner: Uuid, label_id: Uuid) -> Result<()> {
        if self.labels.soft_delete(owner, label_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("label {}", label_id)))
        }
    }
}

fn clean_keywords(keywords: Vec<String>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

// =============================================================================
// LABEL MATCHER
// =============================================================================

/// Matches a user's labels against a content item.
#[derive(Clone)]
pub struct LabelMatcher {
    labels: Arc<dyn LabelRepository>,
    service: LabelService,
    thresholds: SimilarityThresholds,
    max_labels: usize,
}

impl LabelMatcher {
    pub fn new(labels: Arc<dyn LabelRepository>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            service: LabelService::new(labels.clone(), embedder),
            labels,
            thresholds: SimilarityThresholds::default(),
            max_labels: LABEL_MAX_MATCHES,
        }
    }

    pub fn with_thresholds(mut self, thresholds: SimilarityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_max_labels(mut self, max_labels: usize) -> Self {
        self.max_labels = max_labels.max(1);
        self
    }

    pub fn thresholds(&self) -> SimilarityThresholds {
        self.thresholds
    }

    /// Match `user`'s labels against an item's representative text and vector.
    ///
    /// When nothing matches, labels are bootstrapped from the first
    /// candidate tags and returned instead.
    #[instrument(skip(self, text, vector, candidate_tags), fields(subsystem = "search", component = "labels", op = "match_labels", user_id = %user))]
    pub async fn match_labels(
        &self,
        user: Uuid,
        text: &str,
        vector: &[f32],
        candidate_tags: &[String],
    ) -> Result<Vec<Label>> {
        let labels = self.labels.list_for_owner(user).await?;
        let input_count = labels.len();
        let matched = rank_labels(labels, text, vector, self.thresholds, self.max_labels);
        debug!(input_count, result_count = matched.len(), "Labels ranked");

        if !matched.is_empty() || candidate_tags.is_empty() {
            return Ok(matched);
        }
        self.bootstrap(user, candidate_tags).await
    }

    async fn bootstrap(&self, user: Uuid, candidate_tags: &[String]) -> Result<Vec<Label>> {
        let mut created = Vec::new();
        for tag in candidate_tags.iter().take(LABEL_BOOTSTRAP_MAX) {
            let tag = tag.trim();
            if tag.is_empty() {
                continue;
            }
            match self.service.create_label(user, NewLabel::named(tag)).await {
                Ok(CreateLabelOutcome::Created(label)) => created.push(label),
                Ok(outcome) => debug!(tag, ?outcome, "Skipping bootstrap tag"),
                Err(e) => warn!(tag, error = %e, "Bootstrap label creation failed"),
            }
        }
        if !created.is_empty() {
            info!(
                user_id = %user,
                result_count = created.len(),
                "Bootstrapped labels from candidate tags"
            );
        }
        Ok(created)
    }
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
}

/// Rank labels against text and vector without touching the store.
///
/// Returns included labels, then high and low similarity matches, capped at
/// `max_labels`. Deterministic for identical inputs.
pub fn rank_labels(
    labels: Vec<Label>,
    text: &str,
    vector: &[f32],
    thresholds: SimilarityThresholds,
    max_labels: usize,
) -> Vec<Label> {
    let haystack = text.to_lowercase();
    let mut included = Vec::new();
    let mut candidates = Vec::new();

    for label in labels {
        if contains_any(&haystack, &label.exclude_keywords) {
            continue;
        }
        if contains_any(&haystack, &label.include_keywords) {
            included.push(label);
        } else {
            candidates.push(label);
        }
    }

    let buckets = categorize(candidates, vector, thresholds, |l: &Label| l.vector.as_slice());

    included
        .into_iter()
        .chain(buckets.high.into_iter().map(|(l, _)| l))
        .chain(buckets.low.into_iter().map(|(l, _)| l))
        .take(max_labels)
        .collect()
}
