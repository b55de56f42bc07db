//! Batch enrichment of unprocessed content.
//!
//! One batch covers every unprocessed item of a single content type. Items
//! run concurrently behind a semaphore; each goes through describe, per-user
//! label matching and finally one write of description plus processed flag.
//! A failing item is logged and left unprocessed so the next batch picks it
//! up again.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use curio_content::ContentService;
use curio_core::defaults::{BATCH_MAX_CONCURRENCY, ENV_BATCH_CONCURRENCY};
use curio_core::{ContentItem, ContentMetaRepository, Error, Result};
use curio_search::LabelMatcher;

/// Configuration for batch processing.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of items enriched at the same time.
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: BATCH_MAX_CONCURRENCY,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CURIO_BATCH_CONCURRENCY` | `5` | Items enriched concurrently |
    pub fn from_env() -> Self {
        let max_concurrency = std::env::var(ENV_BATCH_CONCURRENCY)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(BATCH_MAX_CONCURRENCY)
            .max(1);
        Self { max_concurrency }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

/// Runs enrichment batches for any content service.
#[derive(Clone)]
pub struct BatchProcessor {
    matcher: LabelMatcher,
    config: PipelineConfig,
}

impl BatchProcessor {
    pub fn new(matcher: LabelMatcher) -> Self {
        Self {
            matcher,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Enrich every unprocessed item of the service's type.
    ///
    /// Returns the ids that completed; failed items are logged and skipped.
    pub async fn process_batch(&self, service: Arc<dyn ContentService>) -> Result<Vec<Uuid>> {
        let (_keep_open, shutdown) = watch::channel(false);
        self.process_batch_until(service, shutdown).await
    }

    /// Like [`process_batch`](Self::process_batch), but stops dispatching new
    /// items once `shutdown` turns true. Items already running are awaited.
    #[instrument(
        skip_all,
        fields(
            subsystem = "jobs",
            component = "pipeline",
            op = "process_batch",
            content_type = %service.content_type()
        )
    )]
    pub async fn process_batch_until(
        &self,
        service: Arc<dyn ContentService>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<Uuid>> {
        let start = Instant::now();
        let items = service.find_unprocessed().await?;
        if items.is_empty() {
            debug!("No unprocessed items");
            return Ok(Vec::new());
        }

        info!(
            input_count = items.len(),
            max_concurrency = self.config.max_concurrency,
            "Batch started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();

        for item in items {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::Job(format!("batch semaphore closed: {}", e)))?;
            if *shutdown.borrow() {
                warn!("Shutdown requested, not dispatching remaining items");
                break;
            }

            let processor = self.clone();
            let service = service.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let id = item.id;
                (id, processor.process_item(service.as_ref(), item).await)
            });
        }

        let mut processed = Vec::new();
        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(()))) => processed.push(id),
                Ok((id, Err(e))) => {
                    failed += 1;
                    error!(content_id = %id, error = %e, "Item enrichment failed");
                }
                Err(e) => {
                    failed += 1;
                    error!(error = ?e, "Item task panicked");
                }
            }
        }

        info!(
            processed = processed.len(),
            failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch finished"
        );
        Ok(processed)
    }

    /// Describe, label for every authorized user, then commit the
    /// description together with the processed flag.
    ///
    /// Nothing of the description reaches the store until every user's labels
    /// are set, so a failure leaves the item exactly as unprocessed as before.
    async fn process_item(&self, service: &dyn ContentService, mut item: ContentItem) -> Result<()> {
        item.description = service.describe(&item).await?;

        let metas = &service.context().metas;
        let content_type = item.content_type();
        for user in &item.authorized_users {
            let labels = self
                .matcher
                .match_labels(
                    *user,
                    item.representative_text(),
                    &item.description.summary_vector,
                    &item.description.keywords,
                )
                .await?;
            let label_ids: Vec<Uuid> = labels.iter().map(|l| l.id).collect();
            metas
                .set_labels(*user, item.id, content_type, &label_ids)
                .await?;
            debug!(content_id = %item.id, user_id = %user, result_count = label_ids.len(), "Labels assigned");
        }

        service.complete(item.id, &item.description).await
    }
}
