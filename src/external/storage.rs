//! Blob storage for uploaded images
//!
//! Objects are addressed by a relative key such as `scan-food/3f9a.jpg` and
//! exposed under a public base URL.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use rand::RngCore;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidPath(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return its public URL
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError>;

    /// Remove an object; a missing object is not an error
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Map a public URL produced by `upload` back to its key
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Random object name keeping the given extension
pub fn generate_file_name(extension: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() {
        hex::encode(bytes)
    } else {
        format!("{}.{}", hex::encode(bytes), ext.to_ascii_lowercase())
    }
}

/// Blob store on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("{}/{}", self.public_base_url, key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_file_name() {
        let a = generate_file_name(".JPG");
        let b = generate_file_name("jpg");
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), 32 + 4);
        assert_ne!(a, b);
        assert!(!generate_file_name("").contains('.'));
    }

    #[tokio::test]
    async fn test_upload_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://localhost/files/");

        let url = store.upload("profile/a.png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(url, "http://localhost/files/profile/a.png");
        assert_eq!(std::fs::read(dir.path().join("profile/a.png")).unwrap(), vec![1, 2, 3]);

        let key = store.key_for_url(&url).unwrap();
        assert_eq!(key, "profile/a.png");
        store.delete(&key).await.unwrap();
        assert!(!dir.path().join("profile/a.png").exists());

        // deleting twice is fine
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://localhost/files");

        assert!(matches!(
            store.upload("../evil.png", vec![0]).await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(store.delete("/etc/passwd").await, Err(StorageError::InvalidPath(_))));
        assert_eq!(store.key_for_url("https://elsewhere/x.png"), None);
    }
}
