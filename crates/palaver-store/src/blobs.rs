//! Opaque blob storage addressed by URL.
//!
//! Blobs land as files named by a generated UUID under a base directory, and
//! callers only ever see `blob://{uuid}` URLs. The application uses this for
//! profile pictures and nothing else.

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};

const URL_SCHEME: &str = "blob://";

#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "blob store initialized");
        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Store a payload and return its URL.
    pub async fn upload(&self, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(StoreError::Blob("empty blob".to_string()));
        }
        if data.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        fs::write(self.file_path(&id), data).await?;
        debug!(id = %id, size = data.len(), "stored blob");
        Ok(format!("{URL_SCHEME}{id}"))
    }

    /// Retrieve a payload by the URL [`upload`](BlobStore::upload) returned.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let id = self.parse_url(url)?;
        let path = self.file_path(&id);
        if !path.exists() {
            return Err(StoreError::Blob(format!("no blob at {url}")));
        }
        Ok(fs::read(&path).await?)
    }

    /// Delete a payload by URL. Fails if the blob does not exist.
    pub async fn delete(&self, url: &str) -> Result<()> {
        let id = self.parse_url(url)?;
        let path = self.file_path(&id);
        if !path.exists() {
            return Err(StoreError::Blob(format!("no blob at {url}")));
        }
        fs::remove_file(&path).await?;
        debug!(id = %id, "deleted blob");
        Ok(())
    }

    fn file_path(&self, id: &Uuid) -> PathBuf {
        // UUIDs only; no caller-controlled file names ever reach the
        // filesystem.
        self.base_path.join(id.to_string())
    }

    fn parse_url(&self, url: &str) -> Result<Uuid> {
        url.strip_prefix(URL_SCHEME)
            .and_then(|rest| Uuid::parse_str(rest).ok())
            .ok_or_else(|| StoreError::Blob(format!("not a blob url: {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (BlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf(), 1024).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn upload_and_fetch() {
        let (store, _dir) = test_store().await;
        let url = store.upload(b"avatar-bytes").await.unwrap();
        assert!(url.starts_with("blob://"));
        assert_eq!(store.fetch(&url).await.unwrap(), b"avatar-bytes");
    }

    #[tokio::test]
    async fn delete_removes() {
        let (store, _dir) = test_store().await;
        let url = store.upload(b"gone-soon").await.unwrap();
        store.delete(&url).await.unwrap();
        assert!(store.fetch(&url).await.is_err());
        assert!(store.delete(&url).await.is_err());
    }

    #[tokio::test]
    async fn size_cap_enforced() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.upload(&[0u8; 2048]).await,
            Err(StoreError::BlobTooLarge { .. })
        ));
        assert!(store.upload(b"").await.is_err());
    }

    #[tokio::test]
    async fn rejects_foreign_urls() {
        let (store, _dir) = test_store().await;
        assert!(store.fetch("https://elsewhere/x").await.is_err());
        assert!(store.fetch("blob://not-a-uuid").await.is_err());
    }
}
