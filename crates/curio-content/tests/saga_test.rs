//! Content creation saga: record layout, fan-out and compensation.

mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use curio_content::{Compensation, ContentService, ContentServices, Upload, UploadContext};
use curio_core::{
    BlobStore, ContentItem, ContentMetaRepository, ContentMetadata, ContentPayload,
    ContentRepository, ContentType, Error, Result, StoredBlob, UploadSource, UserContentMeta,
};
use tempfile::NamedTempFile;
use curio_db::{MemoryBlobStore, MemoryStore};
use curio_inference::MockInferenceBackend;

fn services(store: &MemoryStore, blobs: &MemoryBlobStore) -> ContentServices {
    ContentServices::new(support::context(store, blobs, MockInferenceBackend::new()))
}

async fn item(store: &MemoryStore, id: Uuid) -> ContentItem {
    ContentRepository::get(store, id).await.unwrap().unwrap()
}

/// Meta store whose inserts always fail; cleanup goes to the real store.
struct FailingMetas(MemoryStore);

#[async_trait]
impl ContentMetaRepository for FailingMetas {
    async fn insert_many(&self, _rows: &[UserContentMeta]) -> Result<()> {
        Err(Error::Internal("meta store unavailable".to_string()))
    }

    async fn set_labels(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        content_type: ContentType,
        labels: &[Uuid],
    ) -> Result<()> {
        self.0.set_labels(user_id, content_id, content_type, labels).await
    }

    async fn list_for_content(&self, content_id: Uuid) -> Result<Vec<UserContentMeta>> {
        self.0.list_for_content(content_id).await
    }

    async fn record_read(&self, user_id: Uuid, content_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.0.record_read(user_id, content_id, at).await
    }

    async fn delete_for_contents(&self, content_ids: &[Uuid]) -> Result<u64> {
        self.0.delete_for_contents(content_ids).await
    }
}

#[tokio::test]
async fn test_pure_url_text_creates_only_url_records() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let user = Uuid::new_v4();

    let created = services(&store, &blobs)
        .create(
            Upload::text("https://example.com/a  www.example.org/b\n"),
            &UploadContext::new(user),
        )
        .await
        .unwrap();

    assert_eq!(created.ids.len(), 2);
    assert_eq!(store.content_count().await, 2);
    for id in &created.ids {
        match item(&store, *id).await.payload {
            ContentPayload::Url { parent_text, .. } => assert!(parent_text.is_none()),
            other => panic!("expected url record, got {:?}", other),
        }
        let metas = store.list_for_content(*id).await.unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].content_type, ContentType::Url);
    }
}

#[tokio::test]
async fn test_text_with_links_records_children() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let user = Uuid::new_v4();

    let created = services(&store, &blobs)
        .create(
            Upload::text("Worth reading later https://example.com/post"),
            &UploadContext::new(user),
        )
        .await
        .unwrap();

    assert_eq!(created.ids.len(), 2);
    let text_id = created.primary().unwrap();
    let url_id = created.ids[1];

    match item(&store, text_id).await.payload {
        ContentPayload::Text { child_urls, .. } => assert_eq!(child_urls, vec![url_id]),
        other => panic!("expected text record, got {:?}", other),
    }
    match item(&store, url_id).await.payload {
        ContentPayload::Url { url, parent_text } => {
            assert_eq!(url, "https://example.com/post");
            assert_eq!(parent_text, Some(text_id));
        }
        other => panic!("expected url record, got {:?}", other),
    }
    assert_eq!(
        store.list_for_content(text_id).await.unwrap()[0].content_type,
        ContentType::Text
    );
    assert_eq!(store.meta_count().await, 2);
}

#[tokio::test]
async fn test_group_upload_fans_out_to_members() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let members = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    store.set_group("group-1", members.clone()).await;

    let ctx = UploadContext::new(members[0])
        .with_source(UploadSource::Linebot)
        .with_group("group-1");
    let created = services(&store, &blobs)
        .create(Upload::text("team notes https://example.com/x"), &ctx)
        .await
        .unwrap();

    // 3 members × (1 text + 1 url)
    assert_eq!(store.meta_count().await, 6);
    let text = item(&store, created.primary().unwrap()).await;
    assert_eq!(text.authorized_users, members);
    assert_eq!(text.metadata.group_id.as_deref(), Some("group-1"));
}

#[tokio::test]
async fn test_empty_group_rejects_upload() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let ctx = UploadContext::new(Uuid::new_v4())
        .with_source(UploadSource::Linebot)
        .with_group("ghost-group");

    let err = services(&store, &blobs)
        .create(Upload::image(b"png".to_vec(), "a.png", "image/png"), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_image_upload_stores_blob_and_record() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let user = Uuid::new_v4();

    let created = services(&store, &blobs)
        .create(
            Upload::image(b"\x89PNG....".to_vec(), "cat.png", "image/png"),
            &UploadContext::new(user),
        )
        .await
        .unwrap();

    let image = item(&store, created.primary().unwrap()).await;
    let key = image.payload.object_key().unwrap().to_string();
    assert!(blobs.contains(&key).await);
    assert!(!image.metadata.is_processed);
    assert!(image.description.is_empty());
    assert_eq!(image.authorized_users, vec![user]);
}

#[tokio::test]
async fn test_meta_failure_leaves_nothing_behind() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let mut ctx = support::context(&store, &blobs, MockInferenceBackend::new());
    ctx.metas = Arc::new(FailingMetas(store.clone()));
    let services = ContentServices::new(ctx);
    let user = Uuid::new_v4();

    let err = services
        .create(
            Upload::file(b"%PDF-1.7".to_vec(), "report.pdf", "pdf"),
            &UploadContext::new(user),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert_eq!(store.content_count().await, 0);
    assert_eq!(store.meta_count().await, 0);
    assert!(blobs.is_empty().await);

    let err = services
        .create(
            Upload::text("notes with https://example.com/link"),
            &UploadContext::new(user),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert_eq!(store.content_count().await, 0);
}

#[tokio::test]
async fn test_invalid_uploads_are_rejected_before_writing() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let services = services(&store, &blobs);
    let ctx = UploadContext::new(Uuid::new_v4());

    let err = services
        .create(Upload::file(b"PK..".to_vec(), "a.docx", "docx"), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = services
        .create(Upload::image(Vec::new(), "a.png", "image/png"), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = services.create(Upload::text("   "), &ctx).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    assert_eq!(store.content_count().await, 0);
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_dropped_guard_compensates_in_background() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let ctx = support::context(&store, &blobs, MockInferenceBackend::new());

    let url = ContentItem::new(
        Uuid::new_v4(),
        vec![],
        ContentPayload::Url {
            url: "https://example.com".to_string(),
            parent_text: None,
        },
        ContentMetadata::new(UploadSource::Web, None),
    );
    let id = ContentRepository::insert(&store, &url).await.unwrap();

    let mut guard = Compensation::new(&ctx);
    guard.track_contents(&[id]);
    drop(guard);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.content_count().await, 0);
}

/// Blob store that writes the object and then never acknowledges it.
struct StalledBlobs(MemoryBlobStore);

#[async_trait]
impl BlobStore for StalledBlobs {
    fn new_object_key(&self, file_name: &str, owner: Uuid) -> String {
        self.0.new_object_key(file_name, owner)
    }

    async fn put(&self, object_key: &str, data: &[u8]) -> Result<StoredBlob> {
        self.0.put(object_key, data).await?;
        std::future::pending().await
    }

    async fn delete(&self, object_key: &str) -> Result<()> {
        self.0.delete(object_key).await
    }

    async fn download(&self, url: &str) -> Result<NamedTempFile> {
        self.0.download(url).await
    }
}

#[tokio::test]
async fn test_cancelled_upload_removes_written_blob() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let mut ctx = support::context(&store, &blobs, MockInferenceBackend::new());
    ctx.blobs = Arc::new(StalledBlobs(blobs.clone()));
    let services = ContentServices::new(ctx);

    let upload_ctx = UploadContext::new(Uuid::new_v4());
    let create = services.create(
        Upload::image(b"\x89PNG....".to_vec(), "cat.png", "image/png"),
        &upload_ctx,
    );
    let cancelled = tokio::time::timeout(Duration::from_millis(50), create).await;
    assert!(cancelled.is_err());
    assert_eq!(store.content_count().await, 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_record_read_and_delete_content() {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let services = services(&store, &blobs);
    let user = Uuid::new_v4();

    let created = services
        .create(Upload::text("plain note"), &UploadContext::new(user))
        .await
        .unwrap();
    let id = created.primary().unwrap();
    let text = services.for_type(ContentType::Text);

    text.record_read(user, id).await.unwrap();
    let meta = &store.list_for_content(id).await.unwrap()[0];
    assert_eq!(meta.read_count, 1);
    assert!(meta.last_read_at.is_some());

    let found = text.find_by_ids(&[id]).await.unwrap();
    assert_eq!(found.len(), 1);

    assert!(text.delete_content(id).await.unwrap());
    assert_eq!(store.content_count().await, 0);
    assert_eq!(store.meta_count().await, 0);
}
