//! Object storage
//!
//! Content-facing code only sees [`ObjectStorage`]. Keys are relative,
//! `/`-separated paths such as `tmp/abc.png` or
//! `schedules/演唱会/2025-05-20-巡演/schedule-3-poster-1a2b3c4d.png`.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Copy `from` to `to`, overwriting any existing object at `to`
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Remove an object; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public URL of an object
    fn url_for(&self, key: &str) -> String;
}

pub type DynObjectStorage = Arc<dyn ObjectStorage>;

/// Files under a local directory, served from `public_base_url`
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.root.clone(), config.public_base_url.clone())
    }

    pub fn boxed(self) -> DynObjectStorage {
        Arc::new(self)
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() || key.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if !fs::try_exists(&source).await? {
            return Err(StorageError::NotFound(from.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, &target).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
