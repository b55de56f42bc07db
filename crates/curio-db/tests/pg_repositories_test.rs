//! Integration tests for the PostgreSQL repositories.
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database
//! with the pgvector extension. Run migrations first: `sqlx migrate run`,
//! then `cargo test -p curio-db -- --ignored`.

use chrono::Utc;
use curio_core::{
    ContentFilter, ContentItem, ContentMetaRepository, ContentMetadata, ContentPayload,
    ContentRepository, ContentType, Description, Error, GroupResolver, Label, LabelRepository,
    UploadSource, UserContentMeta,
};
use curio_db::{Database, DEFAULT_TEST_DATABASE_URL};
use sqlx::PgPool;
use uuid::Uuid;

async fn setup_test_db() -> Database {
    let _ = dotenvy::dotenv();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    Database::new(pool)
}

fn text_item(user: Uuid, content: &str) -> ContentItem {
    ContentItem::new(
        user,
        vec![user],
        ContentPayload::Text {
            content: content.to_string(),
            child_urls: vec![],
            parent_file: None,
            page_number: None,
        },
        ContentMetadata::new(UploadSource::Api, None),
    )
}

fn unit_vector(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

#[tokio::test]
#[ignore]
async fn test_content_lifecycle() {
    let db = setup_test_db().await;
    let user = Uuid::new_v4();

    let item = text_item(user, "quarterly planning notes");
    db.contents.insert(&item).await.unwrap();

    let fetched = db.contents.get(item.id).await.unwrap().unwrap();
    assert_eq!(fetched.payload, item.payload);
    assert!(!fetched.metadata.is_processed);

    let description = Description {
        auto_title: "Planning".into(),
        summary: "Notes from planning".into(),
        summary_vector: unit_vector(4, 0),
        keywords: vec!["planning".into()],
        ..Default::default()
    };
    db.contents
        .update_description(item.id, &description)
        .await
        .unwrap();
    db.contents.mark_processed(item.id, true).await.unwrap();

    let fetched = db.contents.get(item.id).await.unwrap().unwrap();
    assert_eq!(fetched.description.summary_vector, unit_vector(4, 0));
    assert!(fetched.metadata.is_processed);
    assert!(fetched.metadata.processed_at.is_some());

    let listed = db
        .contents
        .find(
            &ContentFilter::new()
                .with_ids(vec![item.id])
                .with_authorized_user(user),
        )
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].description.summary_vector.is_empty());

    assert!(db.contents.delete(item.id).await.unwrap());
    assert!(db.contents.get(item.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_complete_sets_description_and_flag_together() {
    let db = setup_test_db().await;
    let user = Uuid::new_v4();
    let item = text_item(user, "garden journal");
    db.contents.insert(&item).await.unwrap();

    let description = Description {
        summary: "garden journal".into(),
        summary_vector: unit_vector(4, 2),
        keywords: vec!["garden".into()],
        ..Default::default()
    };
    db.contents.complete(item.id, &description).await.unwrap();

    let fetched = db.contents.get(item.id).await.unwrap().unwrap();
    assert!(fetched.metadata.is_processed);
    assert!(fetched.metadata.processed_at.is_some());
    assert_eq!(fetched.description.summary, "garden journal");
    assert_eq!(fetched.description.summary_vector, unit_vector(4, 2));

    let err = db.contents.complete(Uuid::new_v4(), &description).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    db.contents.delete(item.id).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_vector_search_skips_zero_vectors() {
    let db = setup_test_db().await;
    let user = Uuid::new_v4();

    let mut blank = text_item(user, "link whose preview failed");
    blank.description.summary_vector = vec![0.0; 4];
    let mut real = text_item(user, "link with a preview");
    real.description.summary_vector = unit_vector(4, 3);
    db.contents
        .insert_many(&[blank.clone(), real.clone()])
        .await
        .unwrap();

    let hits = db
        .contents
        .vector_search(&unit_vector(4, 3), user, None, 10)
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.item.id != blank.id));
    assert!(hits.iter().all(|h| h.score.is_finite()));
    assert_eq!(hits[0].item.id, real.id);

    db.contents.delete_many(&[blank.id, real.id]).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_search_is_scoped_to_authorized_users() {
    let db = setup_test_db().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let mut mine = text_item(alice, "sourdough starter feeding schedule");
    mine.description.summary_vector = unit_vector(4, 1);
    let mut theirs = text_item(bob, "sourdough hydration chart");
    theirs.description.summary_vector = unit_vector(4, 1);
    db.contents
        .insert_many(&[mine.clone(), theirs.clone()])
        .await
        .unwrap();

    let text_hits = db
        .contents
        .full_text_search("sourdough", alice, None, 10)
        .await
        .unwrap();
    assert!(text_hits.iter().any(|h| h.item.id == mine.id));
    assert!(text_hits.iter().all(|h| h.item.id != theirs.id));

    let vector_hits = db
        .contents
        .vector_search(&unit_vector(4, 1), alice, Some(ContentType::Text), 10)
        .await
        .unwrap();
    assert!(vector_hits
        .iter()
        .any(|h| h.item.id == mine.id && (h.score - 1.0).abs() < 1e-4));
    assert!(vector_hits.iter().all(|h| h.item.id != theirs.id));

    db.contents.delete_many(&[mine.id, theirs.id]).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_child_links_update_payload() {
    let db = setup_test_db().await;
    let user = Uuid::new_v4();
    let text = text_item(user, "see https://example.com");
    db.contents.insert(&text).await.unwrap();

    let url_id = Uuid::now_v7();
    db.contents.set_child_urls(text.id, &[url_id]).await.unwrap();

    let fetched = db.contents.get(text.id).await.unwrap().unwrap();
    match fetched.payload {
        ContentPayload::Text { child_urls, .. } => assert_eq!(child_urls, vec![url_id]),
        other => panic!("unexpected payload {:?}", other),
    }
    db.contents.delete(text.id).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_label_duplicate_maps_to_conflict() {
    let db = setup_test_db().await;
    let owner = Uuid::new_v4();
    let label = Label {
        id: Uuid::now_v7(),
        owner,
        name: "recipes".into(),
        description: String::new(),
        vector: unit_vector(4, 2),
        include_keywords: vec![],
        exclude_keywords: vec![],
        is_deleted: false,
        created_at: Utc::now(),
    };
    db.labels.insert(&label).await.unwrap();
    assert!(db.labels.exists(owner, "recipes").await.unwrap());

    let dup = Label {
        id: Uuid::now_v7(),
        ..label.clone()
    };
    let err = db.labels.insert(&dup).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    assert!(db.labels.soft_delete(owner, label.id).await.unwrap());
    assert!(db.labels.list_for_owner(owner).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_meta_rows_and_groups() {
    let db = setup_test_db().await;
    let user = Uuid::new_v4();
    let content = Uuid::new_v4();

    db.metas
        .insert_many(&[UserContentMeta::new(user, content, ContentType::Url)])
        .await
        .unwrap();
    let tag = Uuid::new_v4();
    db.metas
        .set_labels(user, content, ContentType::Url, &[tag])
        .await
        .unwrap();
    db.metas.record_read(user, content, Utc::now()).await.unwrap();

    let rows = db.metas.list_for_content(content).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].labels, vec![tag]);
    assert_eq!(rows[0].read_count, 1);
    assert_eq!(db.metas.delete_for_contents(&[content]).await.unwrap(), 1);

    let group = format!("group-{}", Uuid::new_v4());
    db.groups.add_member(&group, user).await.unwrap();
    assert_eq!(db.groups.members(&group).await.unwrap(), vec![user]);
    assert!(db.groups.remove_member(&group, user).await.unwrap());
}
