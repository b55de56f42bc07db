//! Core data models for curio.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// CONTENT TYPES
// =============================================================================

/// Content variant tag used to select the matching service and table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
    Text,
    File,
    Url,
}

impl ContentType {
    /// All content types, in batch processing order.
    pub const ALL: [ContentType; 4] = [
        ContentType::Image,
        ContentType::Text,
        ContentType::File,
        ContentType::Url,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::File => "file",
            Self::Url => "url",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "text" => Ok(Self::Text),
            "file" => Ok(Self::File),
            "url" => Ok(Self::Url),
            _ => Err(format!("Invalid content type: {}", s)),
        }
    }
}

/// Channel through which content was uploaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadSource {
    #[default]
    Web,
    Api,
    /// Messaging bot; uploads from a group chat fan out to the group.
    Linebot,
}

impl UploadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Api => "api",
            Self::Linebot => "linebot",
        }
    }

    /// Whether uploads from this channel can carry a group id.
    pub fn is_group_capable(&self) -> bool {
        matches!(self, Self::Linebot)
    }
}

impl std::fmt::Display for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadSource {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "api" => Ok(Self::Api),
            "linebot" | "line" => Ok(Self::Linebot),
            _ => Err(format!("Invalid upload source: {}", s)),
        }
    }
}

// =============================================================================
// CONTENT ITEM
// =============================================================================

/// Variant-specific payload of a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPayload {
    Image {
        file_url: String,
        object_key: String,
        file_size: i64,
        file_type: String,
    },
    Text {
        content: String,
        #[serde(default)]
        child_urls: Vec<Uuid>,
        #[serde(default)]
        parent_file: Option<Uuid>,
        #[serde(default)]
        page_number: Option<i32>,
    },
    File {
        title: String,
        file_url: String,
        object_key: String,
        file_size: i64,
        file_type: String,
        #[serde(default)]
        child_texts: Vec<Uuid>,
    },
    Url {
        url: String,
        #[serde(default)]
        parent_text: Option<Uuid>,
    },
}

impl ContentPayload {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Image { .. } => ContentType::Image,
            Self::Text { .. } => ContentType::Text,
            Self::File { .. } => ContentType::File,
            Self::Url { .. } => ContentType::Url,
        }
    }

    /// Blob store object key, for variants backed by an uploaded blob.
    pub fn object_key(&self) -> Option<&str> {
        match self {
            Self::Image { object_key, .. } | Self::File { object_key, .. } => Some(object_key),
            _ => None,
        }
    }

    /// Blob URL, for variants backed by an uploaded blob.
    pub fn file_url(&self) -> Option<&str> {
        match self {
            Self::Image { file_url, .. } | Self::File { file_url, .. } => Some(file_url),
            _ => None,
        }
    }

    /// Text of the payload itself that lexical search should see.
    pub fn searchable_text(&self) -> &str {
        match self {
            Self::Image { .. } => "",
            Self::Text { content, .. } => content,
            Self::File { title, .. } => title,
            Self::Url { url, .. } => url,
        }
    }
}

/// AI-generated description of a content item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub auto_title: String,
    #[serde(default)]
    pub summary: String,
    /// Embedding of the representative summary; empty until processed.
    #[serde(default)]
    pub summary_vector: Vec<f32>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// OCR text (images only).
    #[serde(default)]
    pub ocr_text: String,
    /// Preview thumbnail (URLs only).
    #[serde(default)]
    pub thumbnail_url: String,
}

impl Description {
    pub fn is_empty(&self) -> bool {
        self.auto_title.is_empty()
            && self.summary.is_empty()
            && self.summary_vector.is_empty()
            && self.keywords.is_empty()
            && self.ocr_text.is_empty()
            && self.thumbnail_url.is_empty()
    }

    /// Concatenation of all description text, used for lexical indexing.
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<&str> = vec![
            self.auto_title.as_str(),
            self.summary.as_str(),
            self.ocr_text.as_str(),
        ];
        parts.extend(self.keywords.iter().map(String::as_str));
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }
}

/// Lifecycle metadata of a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub is_deleted: bool,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub upload_source: UploadSource,
    pub group_id: Option<String>,
}

impl ContentMetadata {
    /// Metadata for a freshly ingested, unprocessed item.
    pub fn new(upload_source: UploadSource, group_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            is_deleted: false,
            is_processed: false,
            created_at: now,
            updated_at: now,
            processed_at: None,
            upload_source,
            group_id,
        }
    }
}

/// One ingested unit of user content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub uploader: Uuid,
    pub authorized_users: Vec<Uuid>,
    pub payload: ContentPayload,
    pub description: Description,
    pub metadata: ContentMetadata,
}

impl ContentItem {
    /// Build a new unprocessed item with an empty description.
    pub fn new(
        uploader: Uuid,
        authorized_users: Vec<Uuid>,
        payload: ContentPayload,
        metadata: ContentMetadata,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            uploader,
            authorized_users,
            payload,
            description: Description::default(),
            metadata,
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.payload.content_type()
    }

    pub fn is_authorized(&self, user_id: Uuid) -> bool {
        self.authorized_users.contains(&user_id)
    }

    /// Text used as label-matching input for this item.
    ///
    /// OCR text for images, raw content for text, summary for files and URLs.
    pub fn representative_text(&self) -> &str {
        match &self.payload {
            ContentPayload::Image { .. } => &self.description.ocr_text,
            ContentPayload::Text { content, .. } => content,
            ContentPayload::File { .. } | ContentPayload::Url { .. } => &self.description.summary,
        }
    }

    /// Drop the summary vector (result projection for listings and search).
    pub fn without_vector(mut self) -> Self {
        self.description.summary_vector = Vec::new();
        self
    }
}

/// A content item paired with a relevance score from a store query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredContent {
    pub item: ContentItem,
    pub score: f32,
}

// =============================================================================
// QUERY FILTERS
// =============================================================================

/// Sort order for content listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filter, projection and sort for [`crate::ContentRepository::find`].
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    /// Restrict to these ids (`None` = any id).
    pub ids: Option<Vec<Uuid>>,
    pub content_type: Option<ContentType>,
    /// Restrict to items this user may see.
    pub authorized_user: Option<Uuid>,
    pub is_processed: Option<bool>,
    /// Include soft-deleted items.
    pub include_deleted: bool,
    /// Project the summary vector into results.
    pub include_vectors: bool,
    pub order: SortOrder,
    pub limit: Option<i64>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_authorized_user(mut self, user_id: Uuid) -> Self {
        self.authorized_user = Some(user_id);
        self
    }

    pub fn with_processed(mut self, processed: bool) -> Self {
        self.is_processed = Some(processed);
        self
    }

    pub fn with_vectors(mut self, include: bool) -> Self {
        self.include_vectors = include;
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an item passes this filter (used by in-memory stores).
    pub fn matches(&self, item: &ContentItem) -> bool {
        if let Some(ref ids) = self.ids {
            if !ids.contains(&item.id) {
                return false;
            }
        }
        if let Some(ct) = self.content_type {
            if item.content_type() != ct {
                return false;
            }
        }
        if let Some(user) = self.authorized_user {
            if !item.is_authorized(user) {
                return false;
            }
        }
        if let Some(processed) = self.is_processed {
            if item.metadata.is_processed != processed {
                return false;
            }
        }
        self.include_deleted || !item.metadata.is_deleted
    }
}

// =============================================================================
// LABELS
// =============================================================================

/// A per-user semantic tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub include_keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to create a label.
#[derive(Debug, Clone, Default)]
pub struct NewLabel {
    pub name: String,
    pub description: String,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
}

impl NewLabel {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_include_keywords(mut self, keywords: Vec<String>) -> Self {
        self.include_keywords = keywords;
        self
    }

    pub fn with_exclude_keywords(mut self, keywords: Vec<String>) -> Self {
        self.exclude_keywords = keywords;
        self
    }
}

/// Outcome of a label creation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateLabelOutcome {
    Created(Label),
    /// A non-deleted label with the same name exists for this owner.
    AlreadyExists,
    /// Name or description exceeds its length limit.
    TooLong,
}

impl CreateLabelOutcome {
    pub fn created(self) -> Option<Label> {
        match self {
            Self::Created(label) => Some(label),
            _ => None,
        }
    }
}

// =============================================================================
// USER CONTENT META
// =============================================================================

/// Per-user view of a content item (labels and read tracking).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContentMeta {
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub content_type: ContentType,
    #[serde(default)]
    pub labels: Vec<Uuid>,
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserContentMeta {
    pub fn new(user_id: Uuid, content_id: Uuid, content_type: ContentType) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            content_id,
            content_type,
            labels: Vec::new(),
            last_read_at: None,
            read_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// One row per (user × content id).
    pub fn fan_out(
        user_ids: &[Uuid],
        content_ids: &[Uuid],
        content_type: ContentType,
    ) -> Vec<UserContentMeta> {
        user_ids
            .iter()
            .flat_map(|user| {
                content_ids
                    .iter()
                    .map(move |content| UserContentMeta::new(*user, *content, content_type))
            })
            .collect()
    }
}

// =============================================================================
// BLOBS AND ANALYSIS
// =============================================================================

/// Result of a blob upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
    pub object_key: String,
}

/// Language the analysis output should be written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnalysisLanguage {
    #[default]
    ZhTw,
    En,
}

impl std::str::FromStr for AnalysisLanguage {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zh-tw" | "zh_tw" | "zh" => Ok(Self::ZhTw),
            "en" | "english" => Ok(Self::En),
            _ => Err(format!("Invalid analysis language: {}", s)),
        }
    }
}

/// What the analysis call should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisPrompt {
    pub language: AnalysisLanguage,
    /// When false only title and keywords are requested.
    pub summarize: bool,
}

impl Default for AnalysisPrompt {
    fn default() -> Self {
        Self {
            language: AnalysisLanguage::default(),
            summarize: true,
        }
    }
}

impl AnalysisPrompt {
    pub fn new(language: AnalysisLanguage) -> Self {
        Self {
            language,
            summarize: true,
        }
    }

    pub fn without_summary(mut self) -> Self {
        self.summarize = false;
        self
    }
}

/// Input handed to the analysis backend.
#[derive(Debug, Clone, Copy)]
pub enum AnalysisInput<'a> {
    Text(&'a str),
    Image { data: &'a [u8], mime_type: &'a str },
}

/// Title, summary and keywords returned by content analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}
