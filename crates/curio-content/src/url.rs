//! URL content: link records and preview-based enrichment.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use curio_core::{
    ContentItem, ContentMetadata, ContentPayload, ContentType, Description, Error, Result,
};

use crate::saga::{insert_metas, resolve_authorized_users, Compensation};
use crate::service::{ContentService, Created, ServiceContext, Upload, UploadContext};

/// Build unprocessed URL records, optionally parented to a text record.
pub(crate) fn url_items(
    urls: &[String],
    parent_text: Option<Uuid>,
    uploader: Uuid,
    users: &[Uuid],
    metadata: &ContentMetadata,
) -> Vec<ContentItem> {
    urls.iter()
        .map(|url| {
            ContentItem::new(
                uploader,
                users.to_vec(),
                ContentPayload::Url {
                    url: url.clone(),
                    parent_text,
                },
                metadata.clone(),
            )
        })
        .collect()
}

/// Metadata for a fresh upload.
pub(crate) fn upload_metadata(ctx: &UploadContext) -> ContentMetadata {
    ContentMetadata::new(ctx.source, ctx.effective_group().map(str::to_string))
}

pub struct UrlService {
    ctx: ServiceContext,
}

impl UrlService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn write(
        &self,
        urls: Vec<String>,
        upload: &UploadContext,
        guard: &mut Compensation,
    ) -> Result<Created> {
        let users = resolve_authorized_users(self.ctx.groups.as_ref(), upload).await?;
        let items = url_items(&urls, None, upload.uploader, &users, &upload_metadata(upload));
        let ids = self.ctx.contents.insert_many(&items).await?;
        guard.track_contents(&ids);
        insert_metas(self.ctx.metas.as_ref(), &users, &ids, ContentType::Url).await?;
        Ok(Created { ids })
    }

    async fn preview_description(&self, url: &str) -> Result<Description> {
        let preview = self.ctx.previewer.preview(url).await?;
        let embed_input = if preview.title.is_empty() && preview.description.is_empty() {
            url.to_string()
        } else {
            format!("{} {}", preview.title, preview.description)
                .trim()
                .to_string()
        };
        let summary_vector = self.ctx.embedder.embed_text(&embed_input).await?;
        Ok(Description {
            auto_title: preview.title,
            summary: preview.description,
            summary_vector,
            thumbnail_url: preview.thumbnail_url,
            ..Default::default()
        })
    }
}

#[async_trait]
impl ContentService for UrlService {
    fn content_type(&self) -> ContentType {
        ContentType::Url
    }

    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    #[instrument(skip(self, upload, ctx), fields(subsystem = "content", component = "url", op = "create", user_id = %ctx.uploader))]
    async fn create(&self, upload: Upload, ctx: &UploadContext) -> Result<Created> {
        let Upload::Url { urls } = upload else {
            return Err(Error::InvalidInput("url service expects a url upload".to_string()));
        };
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() {
            return Err(Error::InvalidInput("no urls to store".to_string()));
        }

        let mut guard = Compensation::new(&self.ctx);
        let result = self.write(urls, ctx, &mut guard).await;
        guard.settle(result, ContentType::Url).await
    }

    /// Preview-based description. Never fails: on any error the description
    /// is empty with a zero vector of the embedding dimension.
    #[instrument(skip(self, item), fields(subsystem = "content", component = "url", op = "describe", content_id = %item.id))]
    async fn describe(&self, item: &ContentItem) -> Result<Description> {
        let ContentPayload::Url { url, .. } = &item.payload else {
            return Err(Error::InvalidInput(format!("{} is not a url item", item.id)));
        };
        match self.preview_description(url).await {
            Ok(description) => {
                debug!(title = %description.auto_title, "Url described");
                Ok(description)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Url preview failed, using empty description");
                Ok(Description {
                    summary_vector: vec![0.0; self.ctx.embedder.dimension()],
                    ..Default::default()
                })
            }
        }
    }
}
