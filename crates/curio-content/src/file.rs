//! Uploaded documents. On first enrichment a file is split into per-page
//! text records, which are then analyzed together.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use curio_core::defaults::ANALYSIS_MAX_CHARS;
use curio_core::text::{clean_page_text, truncate_chars};
use curio_core::{
    AnalysisInput, ContentFilter, ContentItem, ContentMetadata, ContentPayload, ContentType,
    Description, Error, Result, SortOrder,
};

use crate::saga::{insert_metas, resolve_authorized_users, Compensation};
use crate::service::{ContentService, Created, ServiceContext, Upload, UploadContext};
use crate::url::upload_metadata;

/// File types accepted for upload.
pub const SUPPORTED_FILE_TYPES: &[&str] = &["pdf"];

pub struct FileService {
    ctx: ServiceContext,
}

impl FileService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn write(
        &self,
        data: Vec<u8>,
        file_name: String,
        file_type: String,
        upload: &UploadContext,
        guard: &mut Compensation,
    ) -> Result<Created> {
        let users = resolve_authorized_users(self.ctx.groups.as_ref(), upload).await?;

        // Tracked before the write so a cancelled upload is still cleaned up.
        let key = self.ctx.blobs.new_object_key(&file_name, upload.uploader);
        guard.track_blob(key.clone());
        let blob = self.ctx.blobs.put(&key, &data).await?;

        let item = ContentItem::new(
            upload.uploader,
            users.clone(),
            ContentPayload::File {
                title: file_name,
                file_url: blob.url,
                object_key: blob.object_key,
                file_size: data.len() as i64,
                file_type,
                child_texts: Vec::new(),
            },
            upload_metadata(upload),
        );
        let id = self.ctx.contents.insert(&item).await?;
        guard.track_contents(&[id]);

        insert_metas(self.ctx.metas.as_ref(), &users, &[id], ContentType::File).await?;
        Ok(Created { ids: vec![id] })
    }

    /// Page texts already split off this file, in page order.
    async fn existing_pages(&self, child_texts: &[Uuid]) -> Result<Vec<String>> {
        let filter = ContentFilter::new()
            .with_ids(child_texts.to_vec())
            .with_content_type(ContentType::Text)
            .with_order(SortOrder::OldestFirst);
        let mut children = self.ctx.contents.find(&filter).await?;
        children.sort_by_key(|c| match &c.payload {
            ContentPayload::Text { page_number, .. } => page_number.unwrap_or(i32::MAX),
            _ => i32::MAX,
        });
        Ok(children
            .into_iter()
            .filter_map(|c| match c.payload {
                ContentPayload::Text { content, .. } => Some(content),
                _ => None,
            })
            .collect())
    }

    /// Extract, clean and store the pages of `item` as child text records.
    async fn split_pages(&self, item: &ContentItem, file_url: &str) -> Result<Vec<String>> {
        let local = self.ctx.blobs.download(file_url).await?;
        let raw_pages = self.ctx.pages.extract_pages(local.path()).await?;

        let pages: Vec<(i32, String)> = raw_pages
            .iter()
            .enumerate()
            .map(|(i, raw)| (i as i32 + 1, clean_page_text(raw)))
            .filter(|(_, text)| !text.is_empty())
            .collect();
        debug!(
            raw_pages = raw_pages.len(),
            kept_pages = pages.len(),
            "Pages extracted"
        );
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let children: Vec<ContentItem> = pages
            .iter()
            .map(|(page_number, text)| {
                ContentItem::new(
                    item.uploader,
                    item.authorized_users.clone(),
                    ContentPayload::Text {
                        content: text.clone(),
                        child_urls: Vec::new(),
                        parent_file: Some(item.id),
                        page_number: Some(*page_number),
                    },
                    ContentMetadata::new(
                        item.metadata.upload_source,
                        item.metadata.group_id.clone(),
                    ),
                )
            })
            .collect();

        let mut guard = Compensation::new(&self.ctx);
        let result = self.store_children(item, &children, &mut guard).await;
        let ids = guard.settle(result, ContentType::Text).await?.ids;
        info!(content_id = %item.id, result_count = ids.len(), "File split into page texts");

        Ok(pages.into_iter().map(|(_, text)| text).collect())
    }

    async fn store_children(
        &self,
        item: &ContentItem,
        children: &[ContentItem],
        guard: &mut Compensation,
    ) -> Result<Created> {
        let ids = self.ctx.contents.insert_many(children).await?;
        guard.track_contents(&ids);
        insert_metas(
            self.ctx.metas.as_ref(),
            &item.authorized_users,
            &ids,
            ContentType::Text,
        )
        .await?;
        self.ctx.contents.set_child_texts(item.id, &ids).await?;
        Ok(Created { ids })
    }
}

#[async_trait]
impl ContentService for FileService {
    fn content_type(&self) -> ContentType {
        ContentType::File
    }

    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    #[instrument(skip(self, upload, ctx), fields(subsystem = "content", component = "file", op = "create", user_id = %ctx.uploader))]
    async fn create(&self, upload: Upload, ctx: &UploadContext) -> Result<Created> {
        let Upload::File {
            data,
            file_name,
            file_type,
        } = upload
        else {
            return Err(Error::InvalidInput("file service expects a file upload".to_string()));
        };
        let file_type = file_type.trim().trim_start_matches('.').to_lowercase();
        if !SUPPORTED_FILE_TYPES.contains(&file_type.as_str()) {
            return Err(Error::InvalidInput(format!(
                "unsupported file type '{}'",
                file_type
            )));
        }
        if data.is_empty() {
            return Err(Error::InvalidInput("file body is empty".to_string()));
        }

        let mut guard = Compensation::new(&self.ctx);
        let result = self.write(data, file_name, file_type, ctx, &mut guard).await;
        guard.settle(result, ContentType::File).await
    }

    #[instrument(skip(self, item), fields(subsystem = "content", component = "file", op = "describe", content_id = %item.id))]
    async fn describe(&self, item: &ContentItem) -> Result<Description> {
        let ContentPayload::File {
            title,
            file_url,
            child_texts,
            ..
        } = &item.payload
        else {
            return Err(Error::InvalidInput(format!("{} is not a file item", item.id)));
        };

        let pages = if child_texts.is_empty() {
            self.split_pages(item, file_url).await?
        } else {
            self.existing_pages(child_texts).await?
        };

        let joined = pages.join("\n");
        let text = if joined.trim().is_empty() {
            warn!("No text extracted, analyzing the file title");
            title.as_str()
        } else {
            truncate_chars(&joined, ANALYSIS_MAX_CHARS)
        };

        let analysis = self
            .ctx
            .analyzer
            .analyze(AnalysisInput::Text(text), &self.ctx.prompt())
            .await?;
        let summary_vector = self.ctx.embed_non_empty(&analysis.summary).await?;
        Ok(Description {
            auto_title: analysis.title,
            summary: analysis.summary,
            summary_vector,
            keywords: analysis.keywords,
            ..Default::default()
        })
    }
}
