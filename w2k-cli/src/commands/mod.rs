//! CLI command implementations

mod books;
mod chapters;
mod cover;
mod export;
mod ingest;
mod jobs;

pub use books::books;
pub use chapters::chapters;
pub use cover::cover;
pub use export::export;
pub use ingest::ingest;
pub use jobs::jobs;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use w2k_core::storage::{LocalStorage, StorageProvider};
use w2k_core::CatalogStore;

/// A library opened from a data directory
pub struct Library {
    pub store: Arc<CatalogStore>,
    pub storage: Arc<dyn StorageProvider>,
}

impl Library {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorage::new(data_dir));
        let store = CatalogStore::open(storage.clone())
            .await
            .with_context(|| format!("Failed to open library at {}", data_dir.display()))?;

        tracing::debug!("Opened library at {}", data_dir.display());
        Ok(Self {
            store: Arc::new(store),
            storage,
        })
    }
}
