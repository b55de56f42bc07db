//! Batch pipeline and worker behaviour over the in-memory stores and the
//! mock inference backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use curio_content::{ContentServices, ServiceContext, Upload, UploadContext};
use curio_core::{
    ContentMetaRepository, ContentRepository, ContentType, Error, Label, LabelRepository, Result,
};
use curio_db::{MemoryBlobStore, MemoryStore};
use curio_inference::MockInferenceBackend;
use curio_jobs::{BatchProcessor, BatchWorker, PipelineConfig, WorkerConfig, WorkerEvent};
use curio_search::LabelMatcher;

struct Fixture {
    store: MemoryStore,
    services: ContentServices,
    processor: BatchProcessor,
}

/// Label store that is down.
struct UnavailableLabels;

#[async_trait]
impl LabelRepository for UnavailableLabels {
    async fn list_for_owner(&self, _owner: Uuid) -> Result<Vec<Label>> {
        Err(Error::Storage("label store unavailable".to_string()))
    }

    async fn exists(&self, _owner: Uuid, _name: &str) -> Result<bool> {
        Err(Error::Storage("label store unavailable".to_string()))
    }

    async fn insert(&self, _label: &Label) -> Result<Uuid> {
        Err(Error::Storage("label store unavailable".to_string()))
    }

    async fn soft_delete(&self, _owner: Uuid, _id: Uuid) -> Result<bool> {
        Err(Error::Storage("label store unavailable".to_string()))
    }
}

fn fixture(backend: MockInferenceBackend) -> Fixture {
    fixture_with_labels(backend, None)
}

fn fixture_with_labels(
    backend: MockInferenceBackend,
    labels: Option<Arc<dyn LabelRepository>>,
) -> Fixture {
    let store = MemoryStore::new();
    let backend = Arc::new(backend);
    let labels = labels.unwrap_or_else(|| Arc::new(store.clone()));
    let ctx = ServiceContext::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(MemoryBlobStore::new()),
        backend.clone(),
    );
    let matcher = LabelMatcher::new(labels, backend);
    Fixture {
        services: ContentServices::new(ctx),
        processor: BatchProcessor::new(matcher).with_config(PipelineConfig::default().with_max_concurrency(2)),
        store,
    }
}

async fn upload_text(fixture: &Fixture, user: Uuid, content: &str) -> Uuid {
    fixture
        .services
        .create(Upload::text(content), &UploadContext::new(user))
        .await
        .unwrap()
        .primary()
        .unwrap()
}

async fn is_processed(store: &MemoryStore, id: Uuid) -> bool {
    ContentRepository::get(store, id)
        .await
        .unwrap()
        .unwrap()
        .metadata
        .is_processed
}

#[tokio::test]
async fn test_failing_item_does_not_block_siblings() {
    let fixture = fixture(
        MockInferenceBackend::new()
            .with_dimension(4)
            .with_failing_input("poison"),
    );
    let first = upload_text(&fixture, Uuid::new_v4(), "first note about gardening").await;
    let poison = upload_text(&fixture, Uuid::new_v4(), "poison pill note").await;
    let third = upload_text(&fixture, Uuid::new_v4(), "third note about cooking").await;

    let mut processed = fixture
        .processor
        .process_batch(fixture.services.for_type(ContentType::Text))
        .await
        .unwrap();
    processed.sort();

    let mut expected = vec![first, third];
    expected.sort();
    assert_eq!(processed, expected);
    assert!(is_processed(&fixture.store, first).await);
    assert!(is_processed(&fixture.store, third).await);
    assert!(!is_processed(&fixture.store, poison).await);

    // The failed item is picked up again by the next batch.
    let retried = fixture
        .processor
        .process_batch(fixture.services.for_type(ContentType::Text))
        .await
        .unwrap();
    assert!(retried.is_empty());
    assert!(!is_processed(&fixture.store, poison).await);
}

#[tokio::test]
async fn test_labeling_failure_commits_no_description() {
    let fixture = fixture_with_labels(
        MockInferenceBackend::new().with_dimension(4),
        Some(Arc::new(UnavailableLabels)),
    );
    let id = upload_text(&fixture, Uuid::new_v4(), "a short note about gardening").await;

    let processed = fixture
        .processor
        .process_batch(fixture.services.for_type(ContentType::Text))
        .await
        .unwrap();
    assert!(processed.is_empty());

    let item = ContentRepository::get(&fixture.store, id).await.unwrap().unwrap();
    assert!(!item.metadata.is_processed);
    assert!(item.metadata.processed_at.is_none());
    assert!(item.description.summary.is_empty());
    assert!(item.description.keywords.is_empty());
    assert!(item.description.summary_vector.is_empty());
}

#[tokio::test]
async fn test_processed_item_gets_description_and_labels() {
    let fixture = fixture(MockInferenceBackend::new().with_dimension(4));
    let user = Uuid::new_v4();
    let garden = Label {
        id: Uuid::now_v7(),
        owner: user,
        name: "garden".to_string(),
        description: String::new(),
        vector: vec![0.0, 0.0, 0.0, 1.0],
        include_keywords: vec!["tomato".to_string()],
        exclude_keywords: vec![],
        is_deleted: false,
        created_at: Utc::now(),
    };
    LabelRepository::insert(&fixture.store, &garden).await.unwrap();

    let id = upload_text(&fixture, user, "planted tomato seedlings today").await;
    fixture
        .processor
        .process_batch(fixture.services.for_type(ContentType::Text))
        .await
        .unwrap();

    let item = ContentRepository::get(&fixture.store, id).await.unwrap().unwrap();
    assert!(item.metadata.is_processed);
    assert_eq!(item.description.summary, "planted tomato seedlings today");
    assert_eq!(item.description.summary_vector.len(), 4);

    let metas = fixture.store.list_for_content(id).await.unwrap();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].labels, vec![garden.id]);
}

#[tokio::test]
async fn test_unlabeled_user_gets_bootstrapped_labels() {
    let fixture = fixture(MockInferenceBackend::new().with_dimension(4));
    let user = Uuid::new_v4();

    let id = upload_text(&fixture, user, "remember buying fresh basil seeds").await;
    fixture
        .processor
        .process_batch(fixture.services.for_type(ContentType::Text))
        .await
        .unwrap();

    let owned = fixture.store.list_for_owner(user).await.unwrap();
    assert_eq!(owned.len(), 3);
    let metas = fixture.store.list_for_content(id).await.unwrap();
    assert_eq!(metas[0].labels.len(), 3);
    for label in &owned {
        assert!(metas[0].labels.contains(&label.id));
    }
}

#[tokio::test]
async fn test_shutdown_stops_dispatching() {
    let fixture = fixture(MockInferenceBackend::new());
    let id = upload_text(&fixture, Uuid::new_v4(), "never reached").await;

    let (_tx, shutdown) = watch::channel(true);
    let processed = fixture
        .processor
        .process_batch_until(fixture.services.for_type(ContentType::Text), shutdown)
        .await
        .unwrap();

    assert!(processed.is_empty());
    assert!(!is_processed(&fixture.store, id).await);
}

#[tokio::test]
async fn test_worker_tick_covers_every_type() {
    let fixture = fixture(MockInferenceBackend::new().with_dimension(4));
    let user = Uuid::new_v4();
    upload_text(&fixture, user, "short note").await;
    upload_text(&fixture, user, "another short note").await;

    let worker = BatchWorker::new(
        &fixture.services,
        fixture.processor.clone(),
        WorkerConfig::default(),
    );
    let mut events = worker.events();
    let (_tx, shutdown) = watch::channel(false);

    assert_eq!(worker.tick(&shutdown).await, 2);

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let WorkerEvent::BatchStarted { content_type } = event {
            started.push(content_type);
        }
    }
    assert_eq!(started, ContentType::ALL.to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_batch_timeout_drains_dispatched_items() {
    // Every inference call takes longer than the whole batch may.
    let fixture = fixture(
        MockInferenceBackend::new()
            .with_dimension(4)
            .with_latency_ms(1_500),
    );
    let fixture = Fixture {
        processor: fixture
            .processor
            .clone()
            .with_config(PipelineConfig::default().with_max_concurrency(1)),
        ..fixture
    };
    let user = Uuid::new_v4();
    let first = upload_text(&fixture, user, "first slow note").await;
    let second = upload_text(&fixture, user, "second slow note").await;

    let worker = BatchWorker::new(
        &fixture.services,
        fixture.processor.clone(),
        WorkerConfig::default().with_batch_timeout(1),
    );
    let mut events = worker.events();
    let (_tx, shutdown) = watch::channel(false);

    assert_eq!(worker.tick(&shutdown).await, 1);

    // The item running when the timeout fired finished completely; the
    // other one was never dispatched and carries no description.
    let mut done = Vec::new();
    for id in [first, second] {
        let item = ContentRepository::get(&fixture.store, id).await.unwrap().unwrap();
        if item.metadata.is_processed {
            assert!(!item.description.summary.is_empty());
            done.push(id);
        } else {
            assert!(item.description.summary.is_empty());
        }
    }
    assert_eq!(done.len(), 1);

    let mut text_failed = false;
    while let Ok(event) = events.try_recv() {
        if let WorkerEvent::BatchFailed {
            content_type: ContentType::Text,
            error,
        } = event
        {
            assert!(error.contains("timeout"));
            text_failed = true;
        }
    }
    assert!(text_failed);
}

#[tokio::test]
async fn test_worker_runs_until_shutdown() {
    let fixture = fixture(MockInferenceBackend::new().with_dimension(4));
    let id = upload_text(&fixture, Uuid::new_v4(), "process me in the background").await;

    let handle = BatchWorker::new(
        &fixture.services,
        fixture.processor.clone(),
        WorkerConfig::default().with_poll_interval(10),
    )
    .start();
    let mut events = handle.events();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::BatchCompleted {
                    content_type: ContentType::Text,
                    processed,
                }) => return processed,
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {:?}", e),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(completed, 1);
    assert!(is_processed(&fixture.store, id).await);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disabled_worker_exits_cleanly() {
    let fixture = fixture(MockInferenceBackend::new());
    let id = upload_text(&fixture, Uuid::new_v4(), "left alone").await;

    let handle = BatchWorker::new(
        &fixture.services,
        fixture.processor.clone(),
        WorkerConfig::default().with_enabled(false),
    )
    .start();
    handle.shutdown().await.unwrap();

    assert!(!is_processed(&fixture.store, id).await);
}
