//! Blob storage backends.
//!
//! Objects are addressed by key `{owner}/{uuidv7}-{file_name}`. The public
//! URL of an object is the configured base URL joined with its key, so a
//! download can map a URL back to a key without a lookup table.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use curio_core::defaults::{BLOB_ROOT, ENV_BLOB_BASE_URL, ENV_BLOB_ROOT};
use curio_core::{BlobStore, Error, Result, StoredBlob};

/// Build a fresh object key for an upload.
fn object_key(owner: Uuid, file_name: &str) -> String {
    let safe_name: String = file_name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe_name = safe_name.trim_start_matches('.');
    let safe_name = if safe_name.is_empty() { "blob" } else { safe_name };
    format!("{}/{}-{}", owner, Uuid::now_v7(), safe_name)
}

/// Write bytes into a fresh temporary file.
fn spool(data: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new()?;
    tmp.write_all(data)?;
    tmp.flush()?;
    Ok(tmp)
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// Filesystem blob store rooted at a local directory.
pub struct FilesystemBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FilesystemBlobStore {
    /// Create a store rooted at `root`, serving URLs under `base_url`.
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CURIO_BLOB_ROOT` | `./data/blobs` |
    /// | `CURIO_BLOB_BASE_URL` | `file://{root}` |
    pub fn from_env() -> Self {
        let root = std::env::var(ENV_BLOB_ROOT).unwrap_or_else(|_| BLOB_ROOT.to_string());
        let base_url =
            std::env::var(ENV_BLOB_BASE_URL).unwrap_or_else(|_| format!("file://{}", root));
        Self::new(root, base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, refusing anything that escapes the root.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::InvalidInput(format!("invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn key_for_url<'a>(&self, url: &'a str) -> Result<&'a str> {
        url.strip_prefix(&self.base_url)
            .map(|rest| rest.trim_start_matches('/'))
            .ok_or_else(|| Error::InvalidInput(format!("URL is not served by this store: {}", url)))
    }
}

/// Write `data` to `temp`, then move it to `dest`.
async fn write_then_rename(temp: &Path, dest: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp, dest).await
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn new_object_key(&self, file_name: &str, owner: Uuid) -> String {
        object_key(owner, file_name)
    }

    #[instrument(skip(self, data), fields(subsystem = "db", component = "blob", op = "put", object_key = %key, size = data.len()))]
    async fn put(&self, key: &str, data: &[u8]) -> Result<StoredBlob> {
        let full_path = self.path_for(key)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "blob: create_dir_all failed");
                e
            })?;
        }

        // Write to a sibling temp path, then rename into place.
        let temp_path = full_path.with_extension("part");
        if let Err(e) = write_then_rename(&temp_path, &full_path, data).await {
            warn!(path = %full_path.display(), error = %e, "blob: write failed, removing partial file");
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %temp_path.display(), error = %cleanup, "blob: partial file left behind");
                }
            }
            return Err(e.into());
        }

        debug!(object_key = %key, "Blob stored");
        Ok(StoredBlob {
            url: format!("{}/{}", self.base_url, key),
            object_key: key.to_string(),
        })
    }

    #[instrument(skip(self), fields(subsystem = "db", component = "blob", op = "delete"))]
    async fn delete(&self, object_key: &str) -> Result<()> {
        let full_path = self.path_for(object_key)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn download(&self, url: &str) -> Result<NamedTempFile> {
        let key = self.key_for_url(url)?;
        let full_path = self.path_for(key)?;
        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("blob {}", key))
            } else {
                Error::Io(e)
            }
        })?;
        spool(&data)
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Blob store that keeps objects in memory. Used by tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

const MEMORY_URL_PREFIX: &str = "mem://";

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn contains(&self, object_key: &str) -> bool {
        self.objects.read().await.contains_key(object_key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn new_object_key(&self, file_name: &str, owner: Uuid) -> String {
        object_key(owner, file_name)
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<StoredBlob> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(StoredBlob {
            url: format!("{}{}", MEMORY_URL_PREFIX, key),
            object_key: key.to_string(),
        })
    }

    async fn delete(&self, object_key: &str) -> Result<()> {
        self.objects.write().await.remove(object_key);
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<NamedTempFile> {
        let key = url.strip_prefix(MEMORY_URL_PREFIX).unwrap_or(url);
        let objects = self.objects.read().await;
        let data = objects
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("blob {}", key)))?;
        spool(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_all(mut file: NamedTempFile) -> Vec<u8> {
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_object_key_shape() {
        let owner = Uuid::new_v4();
        let key = object_key(owner, "report 2024.pdf");
        assert!(key.starts_with(&format!("{}/", owner)));
        assert!(key.ends_with("-report_2024.pdf"));
    }

    #[test]
    fn test_object_key_sanitizes_traversal() {
        let key = object_key(Uuid::new_v4(), "../../etc/passwd");
        assert!(!key.contains(".."));
        assert_eq!(key.matches('/').count(), 1);
    }

    #[tokio::test]
    async fn test_filesystem_upload_download_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path(), "http://blobs.local/");
        let owner = Uuid::new_v4();

        let blob = store.upload(b"%PDF-1.7", "a.pdf", owner).await.unwrap();
        assert!(blob.url.starts_with("http://blobs.local/"));
        assert!(dir.path().join(&blob.object_key).exists());

        let file = store.download(&blob.url).await.unwrap();
        assert_eq!(read_all(file), b"%PDF-1.7");

        store.delete(&blob.object_key).await.unwrap();
        assert!(!dir.path().join(&blob.object_key).exists());
        // Deleting again is fine.
        store.delete(&blob.object_key).await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path(), "http://blobs.local");
        let key = store.new_object_key("a.pdf", Uuid::new_v4());

        // A non-empty directory at the destination makes the rename fail.
        let occupied = dir.path().join(&key);
        std::fs::create_dir_all(occupied.join("inner")).unwrap();

        assert!(store.put(&key, b"%PDF-1.7").await.is_err());
        assert!(!occupied.with_extension("part").exists());
        assert!(occupied.is_dir());
    }

    #[tokio::test]
    async fn test_filesystem_rejects_foreign_url_and_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path(), "http://blobs.local");

        let err = store.download("http://other.host/x").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = store.delete("../outside").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_filesystem_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path(), "http://blobs.local");
        let err = store
            .download("http://blobs.local/someone/missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        let blob = store.upload(b"png", "x.png", Uuid::new_v4()).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(read_all(store.download(&blob.url).await.unwrap()), b"png");

        store.delete(&blob.object_key).await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.download(&blob.url).await.is_err());
    }
}
