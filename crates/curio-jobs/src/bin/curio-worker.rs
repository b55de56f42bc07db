//! curio background worker: enriches and labels uploaded content.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curio_content::{ContentServices, ServiceContext};
use curio_core::defaults::ENV_DATABASE_URL;
use curio_core::SimilarityThresholds;
use curio_db::{Database, FilesystemBlobStore};
use curio_inference::OllamaBackend;
use curio_jobs::{BatchProcessor, BatchWorker, PipelineConfig, WorkerConfig};
use curio_search::LabelMatcher;

fn init_tracing() {
    // LOG_FORMAT - "json" or "text" (default: "text")
    // RUST_LOG   - standard env filter (default: "curio=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "curio_worker=info,curio_jobs=info,curio_content=info,curio_search=info,curio_db=info,curio_inference=info"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let database_url =
        std::env::var(ENV_DATABASE_URL).context("DATABASE_URL must be set for curio-worker")?;
    let db = Database::connect(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;

    let backend = Arc::new(OllamaBackend::from_env());
    let language = backend.config().language;

    let ctx = ServiceContext::new(
        Arc::new(db.contents.clone()),
        Arc::new(db.metas.clone()),
        Arc::new(db.groups.clone()),
        Arc::new(FilesystemBlobStore::from_env()),
        backend.clone(),
    )
    .with_language(language);
    let services = ContentServices::new(ctx);

    let matcher = LabelMatcher::new(Arc::new(db.labels.clone()), backend)
        .with_thresholds(SimilarityThresholds::from_env());
    let processor = BatchProcessor::new(matcher).with_config(PipelineConfig::from_env());

    let handle = BatchWorker::new(&services, processor, WorkerConfig::from_env()).start();
    info!("curio-worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested, waiting for in-flight items");
    handle.shutdown().await?;
    Ok(())
}
