//! In-memory store for tests and local development.
//!
//! One [`MemoryStore`] implements every document-store trait, so a single
//! clone can be handed to services as content, label, meta and group handle.
//! Lexical search scores by the fraction of query terms found in an item's
//! searchable text. Vector search is brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use curio_core::{
    cosine_similarity, ContentFilter, ContentItem, ContentMetaRepository, ContentPayload,
    ContentRepository, ContentType, Description, Error, GroupResolver, Label, LabelRepository,
    Result, ScoredContent, SortOrder, UserContentMeta,
};

/// In-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    contents: Arc<RwLock<HashMap<Uuid, ContentItem>>>,
    labels: Arc<RwLock<Vec<Label>>>,
    metas: Arc<RwLock<Vec<UserContentMeta>>>,
    groups: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the members of a messaging group.
    pub async fn set_group(&self, group_id: impl Into<String>, members: Vec<Uuid>) {
        self.groups.write().await.insert(group_id.into(), members);
    }

    /// Number of stored content items, deleted ones included.
    pub async fn content_count(&self) -> usize {
        self.contents.read().await.len()
    }

    /// Number of stored per-user meta rows.
    pub async fn meta_count(&self) -> usize {
        self.metas.read().await.len()
    }
}

fn searchable(item: &ContentItem) -> String {
    format!(
        "{} {}",
        item.payload.searchable_text(),
        item.description.searchable_text()
    )
    .to_lowercase()
}

fn visible(item: &ContentItem, user_id: Uuid, content_type: Option<ContentType>) -> bool {
    !item.metadata.is_deleted
        && item.is_authorized(user_id)
        && content_type.map_or(true, |ct| item.content_type() == ct)
}

fn sort_scored(hits: &mut [ScoredContent]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.item.metadata.created_at.cmp(&a.item.metadata.created_at))
    });
}

// =============================================================================
// CONTENT
// =============================================================================

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn insert(&self, item: &ContentItem) -> Result<Uuid> {
        let mut contents = self.contents.write().await;
        if contents.contains_key(&item.id) {
            return Err(Error::Conflict(format!("content {} exists", item.id)));
        }
        contents.insert(item.id, item.clone());
        Ok(item.id)
    }

    async fn insert_many(&self, items: &[ContentItem]) -> Result<Vec<Uuid>> {
        let mut contents = self.contents.write().await;
        if let Some(dup) = items.iter().find(|i| contents.contains_key(&i.id)) {
            return Err(Error::Conflict(format!("content {} exists", dup.id)));
        }
        for item in items {
            contents.insert(item.id, item.clone());
        }
        Ok(items.iter().map(|i| i.id).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>> {
        Ok(self.contents.read().await.get(&id).cloned())
    }

    async fn find(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>> {
        let contents = self.contents.read().await;
        let mut items: Vec<ContentItem> = contents
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .map(|item| {
                if filter.include_vectors {
                    item
                } else {
                    item.without_vector()
                }
            })
            .collect();

        items.sort_by(|a, b| {
            let key = a
                .metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then_with(|| a.id.cmp(&b.id));
            match filter.order {
                SortOrder::NewestFirst => key.reverse(),
                SortOrder::OldestFirst => key,
            }
        });
        if let Some(limit) = filter.limit {
            items.truncate(limit.max(0) as usize);
        }
        Ok(items)
    }

    async fn update_description(&self, id: Uuid, description: &Description) -> Result<()> {
        let mut contents = self.contents.write().await;
        let item = contents
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("content {}", id)))?;
        item.description = description.clone();
        item.metadata.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_processed(&self, id: Uuid, processed: bool) -> Result<()> {
        let mut contents = self.contents.write().await;
        let item = contents
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("content {}", id)))?;
        let now = Utc::now();
        item.metadata.is_processed = processed;
        item.metadata.processed_at = processed.then_some(now);
        item.metadata.updated_at = now;
        Ok(())
    }

    async fn complete(&self, id: Uuid, description: &Description) -> Result<()> {
        let mut contents = self.contents.write().await;
        let item = contents
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("content {}", id)))?;
        let now = Utc::now();
        item.description = description.clone();
        item.metadata.is_processed = true;
        item.metadata.processed_at = Some(now);
        item.metadata.updated_at = now;
        Ok(())
    }

    async fn set_child_urls(&self, text_id: Uuid, url_ids: &[Uuid]) -> Result<()> {
        let mut contents = self.contents.write().await;
        match contents.get_mut(&text_id).map(|i| &mut i.payload) {
            Some(ContentPayload::Text { child_urls, .. }) => {
                *child_urls = url_ids.to_vec();
                Ok(())
            }
            _ => Err(Error::NotFound(format!("text {}", text_id))),
        }
    }

    async fn set_child_texts(&self, file_id: Uuid, text_ids: &[Uuid]) -> Result<()> {
        let mut contents = self.contents.write().await;
        match contents.get_mut(&file_id).map(|i| &mut i.payload) {
            Some(ContentPayload::File { child_texts, .. }) => {
                *child_texts = text_ids.to_vec();
                Ok(())
            }
            _ => Err(Error::NotFound(format!("file {}", file_id))),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut contents = self.contents.write().await;
        let item = contents
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("content {}", id)))?;
        item.metadata.is_deleted = true;
        item.metadata.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.contents.write().await.remove(&id).is_some())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        let mut contents = self.contents.write().await;
        Ok(ids.iter().filter(|id| contents.remove(id).is_some()).count() as u64)
    }

    async fn full_text_search(
        &self,
        query: &str,
        user_id: Uuid,
        content_type: Option<ContentType>,
        limit: i64,
    ) -> Result<Vec<ScoredContent>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let contents = self.contents.read().await;
        let mut hits: Vec<ScoredContent> = contents
            .values()
            .filter(|item| visible(item, user_id, content_type))
            .filter_map(|item| {
                let text = searchable(item);
                let found = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (found > 0).then(|| ScoredContent {
                    item: item.clone().without_vector(),
                    score: found as f32 / terms.len() as f32,
                })
            })
            .collect();

        sort_scored(&mut hits);
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        user_id: Uuid,
        content_type: Option<ContentType>,
        limit: i64,
    ) -> Result<Vec<ScoredContent>> {
        let contents = self.contents.read().await;
        let mut hits: Vec<ScoredContent> = contents
            .values()
            .filter(|item| visible(item, user_id, content_type))
            .filter(|item| !item.description.summary_vector.is_empty())
            .filter_map(|item| {
                cosine_similarity(vector, &item.description.summary_vector)
                    .ok()
                    .map(|score| ScoredContent {
                        item: item.clone().without_vector(),
                        score,
                    })
            })
            .collect();

        sort_scored(&mut hits);
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }
}

// =============================================================================
// LABELS
// =============================================================================

#[async_trait]
impl LabelRepository for MemoryStore {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Label>> {
        let labels = self.labels.read().await;
        let mut owned: Vec<Label> = labels
            .iter()
            .filter(|l| l.owner == owner && !l.is_deleted)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn exists(&self, owner: Uuid, name: &str) -> Result<bool> {
        let labels = self.labels.read().await;
        Ok(labels
            .iter()
            .any(|l| l.owner == owner && l.name == name && !l.is_deleted))
    }

    async fn insert(&self, label: &Label) -> Result<Uuid> {
        let mut labels = self.labels.write().await;
        if labels
            .iter()
            .any(|l| l.owner == label.owner && l.name == label.name && !l.is_deleted)
        {
            return Err(Error::Conflict(format!(
                "label '{}' already exists",
                label.name
            )));
        }
        labels.push(label.clone());
        Ok(label.id)
    }

    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool> {
        let mut labels = self.labels.write().await;
        match labels
            .iter_mut()
            .find(|l| l.id == id && l.owner == owner && !l.is_deleted)
        {
            Some(label) => {
                label.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// USER CONTENT META
// =============================================================================

#[async_trait]
impl ContentMetaRepository for MemoryStore {
    async fn insert_many(&self, rows: &[UserContentMeta]) -> Result<()> {
        let mut metas = self.metas.write().await;
        let exists = |row: &UserContentMeta| {
            metas.iter().any(|m| {
                m.user_id == row.user_id
                    && m.content_id == row.content_id
                    && m.content_type == row.content_type
            })
        };
        if let Some(dup) = rows.iter().find(|r| exists(r)) {
            return Err(Error::Conflict(format!(
                "meta for user {} on {} exists",
                dup.user_id, dup.content_id
            )));
        }
        metas.extend_from_slice(rows);
        Ok(())
    }

    async fn set_labels(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        content_type: ContentType,
        labels: &[Uuid],
    ) -> Result<()> {
        let mut metas = self.metas.write().await;
        let now = Utc::now();
        match metas.iter_mut().find(|m| {
            m.user_id == user_id && m.content_id == content_id && m.content_type == content_type
        }) {
            Some(meta) => {
                meta.labels = labels.to_vec();
                meta.updated_at = now;
            }
            None => {
                let mut meta = UserContentMeta::new(user_id, content_id, content_type);
                meta.labels = labels.to_vec();
                metas.push(meta);
            }
        }
        Ok(())
    }

    async fn list_for_content(&self, content_id: Uuid) -> Result<Vec<UserContentMeta>> {
        let metas = self.metas.read().await;
        let mut rows: Vec<UserContentMeta> = metas
            .iter()
            .filter(|m| m.content_id == content_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.user_id);
        Ok(rows)
    }

    async fn record_read(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut metas = self.metas.write().await;
        let mut found = false;
        for meta in metas
            .iter_mut()
            .filter(|m| m.user_id == user_id && m.content_id == content_id)
        {
            meta.read_count += 1;
            meta.last_read_at = Some(at);
            meta.updated_at = at;
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "content meta for user {} on {}",
                user_id, content_id
            )))
        }
    }

    async fn delete_for_contents(&self, content_ids: &[Uuid]) -> Result<u64> {
        let mut metas = self.metas.write().await;
        let before = metas.len();
        metas.retain(|m| !content_ids.contains(&m.content_id));
        Ok((before - metas.len()) as u64)
    }
}

#[async_trait]
impl GroupResolver for MemoryStore {
    async fn members(&self, group_id: &str) -> Result<Vec<Uuid>> {
        Ok(self
            .groups
            .read()
            .await
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }
}
