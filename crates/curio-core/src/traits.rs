//! Core traits for curio's external capabilities.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability. Components
//! receive them as `Arc<dyn Trait>` handles at construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;

// =============================================================================
// DOCUMENT STORE TRAITS
// =============================================================================

/// Repository for content items of every variant.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert one item and return its id.
    async fn insert(&self, item: &ContentItem) -> Result<Uuid>;

    /// Insert several items (all or nothing) and return their ids in order.
    async fn insert_many(&self, items: &[ContentItem]) -> Result<Vec<Uuid>>;

    /// Fetch one item (including its vector), deleted or not.
    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>>;

    /// Find items by filter, with vector projection and sort.
    async fn find(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>>;

    /// Replace an item's description.
    async fn update_description(&self, id: Uuid, description: &Description) -> Result<()>;

    /// Set the processed flag, stamping `processed_at` and `updated_at`.
    async fn mark_processed(&self, id: Uuid, processed: bool) -> Result<()>;

    /// Store the description and set the processed flag in one write, so
    /// readers never see a described item that is still unprocessed.
    async fn complete(&self, id: Uuid, description: &Description) -> Result<()>;

    /// Record the URL children of a text item.
    async fn set_child_urls(&self, text_id: Uuid, url_ids: &[Uuid]) -> Result<()>;

    /// Record the page-text children of a file item.
    async fn set_child_texts(&self, file_id: Uuid, text_ids: &[Uuid]) -> Result<()>;

    /// Flag an item as deleted.
    async fn soft_delete(&self, id: Uuid) -> Result<()>;

    /// Physically remove an item. Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Physically remove several items. Returns the number removed.
    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64>;

    /// Lexical search over items visible to `user_id`, best first.
    async fn full_text_search(
        &self,
        query: &str,
        user_id: Uuid,
        content_type: Option<ContentType>,
        limit: i64,
    ) -> Result<Vec<ScoredContent>>;

    /// Vector similarity search over items visible to `user_id`, best first.
    async fn vector_search(
        &self,
        vector: &[f32],
        user_id: Uuid,
        content_type: Option<ContentType>,
        limit: i64,
    ) -> Result<Vec<ScoredContent>>;
}

/// Repository for per-user labels.
#[async_trait]
pub trait LabelRepository: Send + Sync {
    /// All non-deleted labels of an owner, oldest first.
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Label>>;

    /// Whether a non-deleted label with this name exists for the owner.
    async fn exists(&self, owner: Uuid, name: &str) -> Result<bool>;

    /// Insert a label. Fails with [`Error::Conflict`] on a duplicate name.
    async fn insert(&self, label: &Label) -> Result<Uuid>;

    /// Soft-delete a label owned by `owner`. Returns whether it was found.
    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool>;
}

/// Repository for per-user content metadata rows.
#[async_trait]
pub trait ContentMetaRepository: Send + Sync {
    /// Insert rows (all or nothing).
    async fn insert_many(&self, rows: &[UserContentMeta]) -> Result<()>;

    /// Replace the label set of one user's row.
    async fn set_labels(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        content_type: ContentType,
        labels: &[Uuid],
    ) -> Result<()>;

    /// All rows referencing a content item.
    async fn list_for_content(&self, content_id: Uuid) -> Result<Vec<UserContentMeta>>;

    /// Bump the read counter and stamp `last_read_at`.
    async fn record_read(&self, user_id: Uuid, content_id: Uuid, at: DateTime<Utc>)
        -> Result<()>;

    /// Remove every row referencing these content items.
    async fn delete_for_contents(&self, content_ids: &[Uuid]) -> Result<u64>;
}

/// Resolves a messaging group to its member user ids.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn members(&self, group_id: &str) -> Result<Vec<Uuid>>;
}

// =============================================================================
// BLOB STORE TRAITS
// =============================================================================

/// Object storage for uploaded images and files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Pick a fresh object key for an upload by `owner`. Nothing is written.
    fn new_object_key(&self, file_name: &str, owner: Uuid) -> String;

    /// Store bytes under `object_key`.
    async fn put(&self, object_key: &str, data: &[u8]) -> Result<StoredBlob>;

    /// Store bytes under a fresh object key owned by `owner`.
    ///
    /// Callers that must clean up after cancellation take the key from
    /// [`new_object_key`](Self::new_object_key) and call [`put`](Self::put)
    /// themselves, so the key is known before any byte is written.
    async fn upload(&self, data: &[u8], file_name: &str, owner: Uuid) -> Result<StoredBlob> {
        let key = self.new_object_key(file_name, owner);
        self.put(&key, data).await
    }

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, object_key: &str) -> Result<()>;

    /// Download an object to a temporary local file.
    async fn download(&self, url: &str) -> Result<NamedTempFile>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<crate::Vector>>;

    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .map(|v| v.to_vec())
            .ok_or_else(|| Error::Embedding("Backend returned no embedding".to_string()))
    }

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for content analysis (title, summary, keywords) and OCR.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Analyze text or an image according to `prompt`.
    async fn analyze(
        &self,
        input: AnalysisInput<'_>,
        prompt: &AnalysisPrompt,
    ) -> Result<ContentAnalysis>;

    /// Extract visible text from an image.
    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String>;
}

/// Combined inference backend.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + AnalysisBackend {
    /// Check if the backend is healthy and available.
    async fn health_check(&self) -> Result<bool>;
}
