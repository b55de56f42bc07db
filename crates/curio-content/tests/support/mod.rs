//! Shared fixtures for curio-content integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use curio_content::{LinkPreview, LinkPreviewer, PageExtractor, ServiceContext};
use curio_core::{Error, Result};
use curio_db::{MemoryBlobStore, MemoryStore};
use curio_inference::MockInferenceBackend;

/// Previewer returning a fixed preview, or failing when `None`.
pub struct StubPreviewer(pub Option<LinkPreview>);

#[async_trait]
impl LinkPreviewer for StubPreviewer {
    async fn preview(&self, _url: &str) -> Result<LinkPreview> {
        self.0
            .clone()
            .ok_or_else(|| Error::Request("preview unavailable".to_string()))
    }
}

/// Extractor returning fixed pages and counting its calls.
pub struct StubPages {
    pub pages: Vec<String>,
    pub calls: AtomicUsize,
}

impl StubPages {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageExtractor for StubPages {
    async fn extract_pages(&self, _path: &Path) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.clone())
    }
}

/// Context over the in-memory stores with stubbed previews and pages.
pub fn context(
    store: &MemoryStore,
    blobs: &MemoryBlobStore,
    backend: MockInferenceBackend,
) -> ServiceContext {
    ServiceContext::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(blobs.clone()),
        Arc::new(backend),
    )
    .with_previewer(Arc::new(StubPreviewer(None)))
    .with_page_extractor(Arc::new(StubPages::new(&[])))
}
