//! Periodic batch worker running the enrichment pipeline for every content type.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use curio_content::{ContentService, ContentServices};
use curio_core::defaults::{
    BATCH_TIMEOUT_SECS, ENV_BATCH_TIMEOUT_SECS, ENV_POLL_INTERVAL_MS, ENV_WORKER_ENABLED,
    EVENT_BUS_CAPACITY, POLL_INTERVAL_MS,
};
use curio_core::{ContentType, Error, Result};

use crate::pipeline::BatchProcessor;

/// Configuration for the batch worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between ticks in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound for one batch in seconds.
    pub batch_timeout_secs: u64,
    /// Whether to run batches at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: POLL_INTERVAL_MS,
            batch_timeout_secs: BATCH_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CURIO_WORKER_ENABLED` | `true` | Enable/disable batch processing |
    /// | `CURIO_POLL_INTERVAL_MS` | `30000` | Pause between ticks |
    /// | `CURIO_BATCH_TIMEOUT_SECS` | `1800` | Upper bound for one batch |
    pub fn from_env() -> Self {
        let enabled = std::env::var(ENV_WORKER_ENABLED)
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var(ENV_POLL_INTERVAL_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(POLL_INTERVAL_MS);

        let batch_timeout_secs = std::env::var(ENV_BATCH_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(BATCH_TIMEOUT_SECS)
            .max(1);

        Self {
            poll_interval_ms,
            batch_timeout_secs,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_batch_timeout(mut self, secs: u64) -> Self {
        self.batch_timeout_secs = secs.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the batch worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// A batch for one content type started.
    BatchStarted { content_type: ContentType },
    /// A batch finished; `processed` items completed.
    BatchCompleted {
        content_type: ContentType,
        processed: usize,
    },
    /// A batch could not run or exceeded its timeout.
    BatchFailed {
        content_type: ContentType,
        error: String,
    },
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
///
/// Dropping the handle also stops the worker after its current batch.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal shutdown and wait for in-flight items to finish.
    pub async fn shutdown(self) -> Result<()> {
        // The worker may already have exited (disabled), so no receiver is required.
        self.shutdown_tx.send_replace(true);
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Worker task failed: {}", e)))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that periodically enriches unprocessed content of every type.
pub struct BatchWorker {
    services: Vec<Arc<dyn ContentService>>,
    processor: BatchProcessor,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl BatchWorker {
    pub fn new(services: &ContentServices, processor: BatchProcessor, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            services: services.all(),
            processor,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_rx = self.event_tx.subscribe();
        let task = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    #[instrument(skip_all, fields(subsystem = "jobs", component = "worker", op = "run"))]
    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("Batch worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_timeout_secs = self.config.batch_timeout_secs,
            max_concurrency = self.processor.config().max_concurrency,
            "Batch worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.tick(&shutdown_rx).await;

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Batch worker received shutdown signal");
                        break;
                    }
                }
                _ = sleep(poll_interval) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Batch worker stopped");
    }

    /// Run one batch per content type, in order. Returns the number of
    /// items completed across all batches.
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> usize {
        let start = Instant::now();
        let mut total = 0;

        for service in &self.services {
            if *shutdown.borrow() {
                break;
            }
            let content_type = service.content_type();
            let _ = self
                .event_tx
                .send(WorkerEvent::BatchStarted { content_type });

            let (ids, timed_out) = match self.run_batch(service.clone(), shutdown.clone()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(%content_type, error = %e, "Batch failed");
                    let _ = self.event_tx.send(WorkerEvent::BatchFailed {
                        content_type,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            total += ids.len();
            if timed_out {
                let _ = self.event_tx.send(WorkerEvent::BatchFailed {
                    content_type,
                    error: format!(
                        "Batch exceeded timeout of {}s ({} items completed)",
                        self.config.batch_timeout_secs,
                        ids.len()
                    ),
                });
            } else {
                let _ = self.event_tx.send(WorkerEvent::BatchCompleted {
                    content_type,
                    processed: ids.len(),
                });
            }
        }

        debug!(
            processed = total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Worker tick finished"
        );
        total
    }

    /// Run one batch under the batch timeout.
    ///
    /// The timeout and worker shutdown both only stop dispatch: items already
    /// running are drained, never dropped mid-write. Returns the completed ids
    /// and whether the timeout fired.
    async fn run_batch(
        &self,
        service: Arc<dyn ContentService>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(Vec<Uuid>, bool)> {
        let content_type = service.content_type();
        let (stop_tx, stop_rx) = watch::channel(*shutdown.borrow());
        let batch = self.processor.process_batch_until(service, stop_rx);
        tokio::pin!(batch);
        let deadline = sleep(Duration::from_secs(self.config.batch_timeout_secs));
        tokio::pin!(deadline);

        let mut timed_out = false;
        let mut watching = true;
        loop {
            tokio::select! {
                result = &mut batch => return result.map(|ids| (ids, timed_out)),
                _ = &mut deadline, if !timed_out => {
                    timed_out = true;
                    warn!(
                        %content_type,
                        "Batch exceeded timeout of {}s, draining dispatched items",
                        self.config.batch_timeout_secs
                    );
                    stop_tx.send_replace(true);
                }
                changed = shutdown.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        stop_tx.send_replace(true);
                    } else if *shutdown.borrow() {
                        stop_tx.send_replace(true);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 30_000);
        assert_eq!(config.batch_timeout_secs, 1800);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_batch_timeout(0)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.batch_timeout_secs, 1);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_event_clone() {
        let event = WorkerEvent::BatchCompleted {
            content_type: ContentType::Url,
            processed: 3,
        };
        assert_eq!(event.clone(), event);
        assert!(format!("{:?}", event).contains("BatchCompleted"));
    }
}
