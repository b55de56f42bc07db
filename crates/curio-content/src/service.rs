//! The per-variant content service contract and the registry that selects a
//! service by content type.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use curio_core::{
    AnalysisBackend, AnalysisLanguage, AnalysisPrompt, BlobStore, ContentFilter, ContentItem,
    ContentMetaRepository, ContentRepository, ContentType, Description, EmbeddingBackend,
    GroupResolver, Result, SortOrder, UploadSource,
};

use crate::extract::{PageExtractor, PdfTextExtractor};
use crate::file::FileService;
use crate::image::ImageService;
use crate::preview::{HttpLinkPreviewer, LinkPreviewer};
use crate::text::TextService;
use crate::url::UrlService;

// =============================================================================
// SERVICE CONTEXT
// =============================================================================

/// Capability handles shared by every content service.
#[derive(Clone)]
pub struct ServiceContext {
    pub contents: Arc<dyn ContentRepository>,
    pub metas: Arc<dyn ContentMetaRepository>,
    pub groups: Arc<dyn GroupResolver>,
    pub blobs: Arc<dyn BlobStore>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub analyzer: Arc<dyn AnalysisBackend>,
    pub previewer: Arc<dyn LinkPreviewer>,
    pub pages: Arc<dyn PageExtractor>,
    pub language: AnalysisLanguage,
}

impl ServiceContext {
    /// Build a context around one inference backend serving both embedding
    /// and analysis. Link previews use HTTP and PDFs go through `pdftotext`.
    pub fn new<B>(
        contents: Arc<dyn ContentRepository>,
        metas: Arc<dyn ContentMetaRepository>,
        groups: Arc<dyn GroupResolver>,
        blobs: Arc<dyn BlobStore>,
        inference: Arc<B>,
    ) -> Self
    where
        B: EmbeddingBackend + AnalysisBackend + 'static,
    {
        Self {
            contents,
            metas,
            groups,
            blobs,
            embedder: inference.clone(),
            analyzer: inference,
            previewer: Arc::new(HttpLinkPreviewer::new()),
            pages: Arc::new(PdfTextExtractor::default()),
            language: AnalysisLanguage::default(),
        }
    }

    pub fn with_previewer(mut self, previewer: Arc<dyn LinkPreviewer>) -> Self {
        self.previewer = previewer;
        self
    }

    pub fn with_page_extractor(mut self, pages: Arc<dyn PageExtractor>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_language(mut self, language: AnalysisLanguage) -> Self {
        self.language = language;
        self
    }

    /// Full analysis prompt in the configured language.
    pub(crate) fn prompt(&self) -> AnalysisPrompt {
        AnalysisPrompt::new(self.language)
    }

    /// Embed `text`, or return an empty vector when there is nothing to embed.
    pub(crate) async fn embed_non_empty(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.embedder.embed_text(text).await
    }
}

// =============================================================================
// UPLOADS
// =============================================================================

/// Raw content handed to [`ContentService::create`].
#[derive(Debug, Clone)]
pub enum Upload {
    Image {
        data: Vec<u8>,
        file_name: String,
        mime_type: String,
    },
    Text {
        content: String,
    },
    File {
        data: Vec<u8>,
        file_name: String,
        file_type: String,
    },
    Url {
        urls: Vec<String>,
    },
}

impl Upload {
    pub fn image(data: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn file(data: Vec<u8>, file_name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self::File {
            data,
            file_name: file_name.into(),
            file_type: file_type.into(),
        }
    }

    pub fn urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Url {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// Content type of the records this upload primarily produces.
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Image { .. } => ContentType::Image,
            Self::Text { .. } => ContentType::Text,
            Self::File { .. } => ContentType::File,
            Self::Url { .. } => ContentType::Url,
        }
    }
}

/// Who uploaded, through which channel, and from which group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadContext {
    pub uploader: Uuid,
    pub source: UploadSource,
    pub group_id: Option<String>,
}

impl UploadContext {
    pub fn new(uploader: Uuid) -> Self {
        Self {
            uploader,
            source: UploadSource::default(),
            group_id: None,
        }
    }

    pub fn with_source(mut self, source: UploadSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// The group id, when it applies to this upload's channel.
    pub fn effective_group(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .filter(|g| !g.is_empty() && self.source.is_group_capable())
    }
}

/// Ids of every content record written by one `create` call.
///
/// For text uploads the text id (if a text record was written) comes first,
/// followed by the URL ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Created {
    pub ids: Vec<Uuid>,
}

impl Created {
    pub fn primary(&self) -> Option<Uuid> {
        self.ids.first().copied()
    }
}

// =============================================================================
// CONTENT SERVICE
// =============================================================================

/// One content variant: creation, enrichment and shared maintenance.
#[async_trait]
pub trait ContentService: Send + Sync {
    fn content_type(&self) -> ContentType;

    fn context(&self) -> &ServiceContext;

    /// Write the upload's records, fan out meta rows and roll back on failure.
    async fn create(&self, upload: Upload, ctx: &UploadContext) -> Result<Created>;

    /// Compute the description of an unprocessed item.
    async fn describe(&self, item: &ContentItem) -> Result<Description>;

    /// Items of this type by id, newest first, without vectors.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ContentItem>> {
        let filter = ContentFilter::new()
            .with_ids(ids.to_vec())
            .with_content_type(self.content_type())
            .with_order(SortOrder::NewestFirst);
        self.context().contents.find(&filter).await
    }

    /// Items of this type waiting for enrichment, oldest first.
    async fn find_unprocessed(&self) -> Result<Vec<ContentItem>> {
        let filter = ContentFilter::new()
            .with_content_type(self.content_type())
            .with_processed(false)
            .with_vectors(true)
            .with_order(SortOrder::OldestFirst);
        self.context().contents.find(&filter).await
    }

    async fn update_description(&self, id: Uuid, description: &Description) -> Result<()> {
        self.context()
            .contents
            .update_description(id, description)
            .await
    }

    async fn mark_processed(&self, id: Uuid, processed: bool) -> Result<()> {
        self.context().contents.mark_processed(id, processed).await
    }

    /// Commit a finished enrichment: description plus processed flag.
    async fn complete(&self, id: Uuid, description: &Description) -> Result<()> {
        self.context().contents.complete(id, description).await
    }

    /// Hard-delete one item and its meta rows. Returns whether it existed.
    async fn delete_content(&self, id: Uuid) -> Result<bool> {
        let ctx = self.context();
        ctx.metas.delete_for_contents(&[id]).await?;
        ctx.contents.delete(id).await
    }

    /// Hard-delete several items and their meta rows. Returns the number removed.
    async fn delete_contents(&self, ids: &[Uuid]) -> Result<u64> {
        let ctx = self.context();
        ctx.metas.delete_for_contents(ids).await?;
        ctx.contents.delete_many(ids).await
    }

    /// Record that `user_id` opened an item.
    async fn record_read(&self, user_id: Uuid, content_id: Uuid) -> Result<()> {
        self.context()
            .metas
            .record_read(user_id, content_id, Utc::now())
            .await
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// The four variant services over one shared context.
#[derive(Clone)]
pub struct ContentServices {
    image: Arc<ImageService>,
    text: Arc<TextService>,
    file: Arc<FileService>,
    url: Arc<UrlService>,
}

impl ContentServices {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            image: Arc::new(ImageService::new(ctx.clone())),
            text: Arc::new(TextService::new(ctx.clone())),
            file: Arc::new(FileService::new(ctx.clone())),
            url: Arc::new(UrlService::new(ctx)),
        }
    }

    /// The service handling `content_type`.
    pub fn for_type(&self, content_type: ContentType) -> Arc<dyn ContentService> {
        match content_type {
            ContentType::Image => self.image.clone(),
            ContentType::Text => self.text.clone(),
            ContentType::File => self.file.clone(),
            ContentType::Url => self.url.clone(),
        }
    }

    /// Every service, in [`ContentType::ALL`] order.
    pub fn all(&self) -> Vec<Arc<dyn ContentService>> {
        ContentType::ALL
            .iter()
            .map(|ct| self.for_type(*ct))
            .collect()
    }

    /// Route an upload to the service of its content type.
    pub async fn create(&self, upload: Upload, ctx: &UploadContext) -> Result<Created> {
        self.for_type(upload.content_type())
            .create(upload, ctx)
            .await
    }
}
