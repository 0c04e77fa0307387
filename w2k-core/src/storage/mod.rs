//! Blob storage abstraction underneath the catalog store

use crate::error::StorageError;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Abstract blob storage provider.
/// Writes must be durable once the future resolves.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Read data from the given path
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Write data to the given path, replacing any previous content
    async fn write(&self, path: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> StorageResult<bool>;
}

/// Local filesystem storage provider
pub struct LocalStorage {
    root: std::path::PathBuf,
}

impl LocalStorage {
    /// Create a new local storage provider with the given root directory
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this provider
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Safely resolve a path, preventing path traversal attacks
    pub fn full_path(&self, path: &str) -> StorageResult<std::path::PathBuf> {
        use std::path::Component;

        let mut normalized = std::path::PathBuf::new();
        for component in std::path::Path::new(path).components() {
            match component {
                Component::Normal(c) => normalized.push(c),
                Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                    return Err(StorageError::BackendError(
                        "Path traversal attempt detected".to_string(),
                    ));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(StorageError::BackendError("Empty path".to_string()));
        }

        Ok(self.root.join(normalized))
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match tokio::fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    /// Writes to a temp file, syncs it, then renames over the target
    async fn write(&self, path: &str, data: Vec<u8>) -> StorageResult<()> {
        let full_path = self.full_path(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;
        }

        // Same directory as the target so the rename stays on one filesystem
        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = std::path::PathBuf::from(temp_name);

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        file.write_all(&data)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        drop(file);

        tokio::fs::rename(&temp_path, &full_path)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let full_path = self.full_path(path)?;
        tokio::fs::try_exists(full_path)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))
    }
}

/// In-memory storage provider (for testing and ephemeral servers)
#[derive(Default)]
pub struct MemoryStorage {
    data: std::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> StorageError {
        StorageError::BackendError("memory storage lock poisoned".to_string())
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.data
            .read()
            .map_err(Self::poisoned)?
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> StorageResult<()> {
        self.data
            .write()
            .map_err(Self::poisoned)?
            .insert(path.to_string(), data);
        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.data.read().map_err(Self::poisoned)?.contains_key(path))
    }
}
