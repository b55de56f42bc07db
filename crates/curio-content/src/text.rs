//! Free-text content. URLs inside a text become child URL records.

use async_trait::async_trait;
use tracing::{debug, instrument};

use curio_core::defaults::SHORT_TEXT_WORDS;
use curio_core::{
    count_words, extract_urls, is_pure_urls, AnalysisInput, ContentItem, ContentPayload,
    ContentType, Description, Error, Result,
};

use crate::saga::{insert_metas, resolve_authorized_users, Compensation};
use crate::service::{ContentService, Created, ServiceContext, Upload, UploadContext};
use crate::url::{upload_metadata, url_items};

pub struct TextService {
    ctx: ServiceContext,
}

impl TextService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn write(
        &self,
        content: String,
        upload: &UploadContext,
        guard: &mut Compensation,
    ) -> Result<Created> {
        let users = resolve_authorized_users(self.ctx.groups.as_ref(), upload).await?;
        let metadata = upload_metadata(upload);
        let urls = extract_urls(&content);

        // A message that is nothing but links stores only the links.
        if is_pure_urls(&content) {
            let items = url_items(&urls, None, upload.uploader, &users, &metadata);
            let ids = self.ctx.contents.insert_many(&items).await?;
            guard.track_contents(&ids);
            insert_metas(self.ctx.metas.as_ref(), &users, &ids, ContentType::Url).await?;
            return Ok(Created { ids });
        }

        let text = ContentItem::new(
            upload.uploader,
            users.clone(),
            ContentPayload::Text {
                content,
                child_urls: Vec::new(),
                parent_file: None,
                page_number: None,
            },
            metadata.clone(),
        );
        let text_id = self.ctx.contents.insert(&text).await?;
        guard.track_contents(&[text_id]);

        let mut url_ids = Vec::new();
        if !urls.is_empty() {
            let items = url_items(&urls, Some(text_id), upload.uploader, &users, &metadata);
            url_ids = self.ctx.contents.insert_many(&items).await?;
            guard.track_contents(&url_ids);
            self.ctx.contents.set_child_urls(text_id, &url_ids).await?;
        }
        debug!(%text_id, url_count = url_ids.len(), "Text records written");

        insert_metas(self.ctx.metas.as_ref(), &users, &[text_id], ContentType::Text).await?;
        insert_metas(self.ctx.metas.as_ref(), &users, &url_ids, ContentType::Url).await?;

        let mut ids = vec![text_id];
        ids.extend(url_ids);
        Ok(Created { ids })
    }
}

#[async_trait]
impl ContentService for TextService {
    fn content_type(&self) -> ContentType {
        ContentType::Text
    }

    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    #[instrument(skip(self, upload, ctx), fields(subsystem = "content", component = "text", op = "create", user_id = %ctx.uploader))]
    async fn create(&self, upload: Upload, ctx: &UploadContext) -> Result<Created> {
        let Upload::Text { content } = upload else {
            return Err(Error::InvalidInput("text service expects a text upload".to_string()));
        };
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("text content must not be empty".to_string()));
        }

        let mut guard = Compensation::new(&self.ctx);
        let result = self.write(content, ctx, &mut guard).await;
        guard.settle(result, ContentType::Text).await
    }

    /// Short texts keep their content as the summary and embed it directly;
    /// longer ones are summarized and the summary is embedded.
    #[instrument(skip(self, item), fields(subsystem = "content", component = "text", op = "describe", content_id = %item.id))]
    async fn describe(&self, item: &ContentItem) -> Result<Description> {
        let ContentPayload::Text { content, .. } = &item.payload else {
            return Err(Error::InvalidInput(format!("{} is not a text item", item.id)));
        };

        let words = count_words(content);
        if words < SHORT_TEXT_WORDS {
            debug!(words, "Short text, skipping summarization");
            let analysis = self
                .ctx
                .analyzer
                .analyze(AnalysisInput::Text(content), &self.ctx.prompt().without_summary())
                .await?;
            let summary_vector = self.ctx.embedder.embed_text(content).await?;
            return Ok(Description {
                auto_title: analysis.title,
                summary: content.clone(),
                summary_vector,
                keywords: analysis.keywords,
                ..Default::default()
            });
        }

        let analysis = self
            .ctx
            .analyzer
            .analyze(AnalysisInput::Text(content), &self.ctx.prompt())
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
