//! Image content: blob upload on create, OCR plus vision analysis on describe.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use curio_core::{
    AnalysisInput, ContentItem, ContentPayload, ContentType, Description, Error, Result,
};

use crate::saga::{insert_metas, resolve_authorized_users, Compensation};
use crate::service::{ContentService, Created, ServiceContext, Upload, UploadContext};
use crate::url::upload_metadata;

pub struct ImageService {
    ctx: ServiceContext,
}

impl ImageService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn write(
        &self,
        data: Vec<u8>,
        file_name: String,
        mime_type: String,
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
            ContentPayload::Image {
                file_url: blob.url,
                object_key: blob.object_key,
                file_size: data.len() as i64,
                file_type: mime_type,
            },
            upload_metadata(upload),
        );
        let id = self.ctx.contents.insert(&item).await?;
        guard.track_contents(&[id]);

        insert_metas(self.ctx.metas.as_ref(), &users, &[id], ContentType::Image).await?;
        Ok(Created { ids: vec![id] })
    }
}

#[async_trait]
impl ContentService for ImageService {
    fn content_type(&self) -> ContentType {
        ContentType::Image
    }

    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    #[instrument(skip(self, upload, ctx), fields(subsystem = "content", component = "image", op = "create", user_id = %ctx.uploader))]
    async fn create(&self, upload: Upload, ctx: &UploadContext) -> Result<Created> {
        let Upload::Image {
            data,
            file_name,
            mime_type,
        } = upload
        else {
            return Err(Error::InvalidInput("image service expects an image upload".to_string()));
        };
        if data.is_empty() {
            return Err(Error::InvalidInput("image body is empty".to_string()));
        }

        let mut guard = Compensation::new(&self.ctx);
        let result = self.write(data, file_name, mime_type, ctx, &mut guard).await;
        guard.settle(result, ContentType::Image).await
    }

    #[instrument(skip(self, item), fields(subsystem = "content", component = "image", op = "describe", content_id = %item.id))]
    async fn describe(&self, item: &ContentItem) -> Result<Description> {
        let ContentPayload::Image {
            file_url,
            file_type,
            ..
        } = &item.payload
        else {
            return Err(Error::InvalidInput(format!("{} is not an image item", item.id)));
        };

        let local = self.ctx.blobs.download(file_url).await?;
        let data = tokio::fs::read(local.path()).await?;

        let ocr_text = match self.ctx.analyzer.extract_text(&data, file_type).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "OCR failed, continuing without text");
                String::new()
            }
        };

        let analysis = self
            .ctx
            .analyzer
            .analyze(
                AnalysisInput::Image {
                    data: &data,
                    mime_type: file_type,
                },
                &self.ctx.prompt(),
            )
            .await?;
        let summary_vector = self.ctx.embed_non_empty(&analysis.summary).await?;
        debug!(ocr_chars = ocr_text.chars().count(), "Image described");

        Ok(Description {
            auto_title: analysis.title,
            summary: analysis.summary,
            summary_vector,
            keywords: analysis.keywords,
            ocr_text,
            ..Default::default()
        })
    }
}
