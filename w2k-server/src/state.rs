//! Application state

use crate::config::{Config, DeliveryConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use w2k_core::storage::{LocalStorage, StorageProvider};
use w2k_core::{
    BookId, CatalogStore, ChapterId, Deliverer, EpubPackager, ExportQueue, IngestService,
    SmtpDeliverer, Store, WebhookDeliverer,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Catalog of books, chapters and export jobs
    pub store: Arc<dyn Store>,

    /// Blob provider holding chapter bodies and export artifacts
    pub storage: Arc<dyn StorageProvider>,

    pub ingest: IngestService,

    pub exports: ExportQueue,

    /// Channel for SSE events
    pub event_tx: broadcast::Sender<ServerEvent>,
}

/// Server-sent events not covered by the export queue
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A chapter was written
    ChapterIngested {
        book_id: BookId,
        chapter_id: ChapterId,
        number_in_book: u32,
    },

    /// A book cover was replaced
    CoverUpdated { book_id: BookId },
}

impl AppState {
    /// Create application state backed by the configured data directory
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create storage directory {}",
                    config.storage_path.display()
                )
            })?;

        let storage = Arc::new(LocalStorage::new(&config.storage_path));
        Self::with_provider(config, storage).await
    }

    /// Create application state over an arbitrary blob provider
    pub async fn with_provider(config: Config, storage: Arc<dyn StorageProvider>) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(
            CatalogStore::open(storage.clone())
                .await
                .context("Failed to load catalog")?,
        );
        let packager = Arc::new(EpubPackager::new(storage.clone()));
        let mut exports = ExportQueue::new(store.clone(), packager);
        if let Some(delivery) = &config.delivery {
            let deliverer = deliverer(delivery)?;
            tracing::info!("Delivering finished exports by {}", deliverer.name());
            exports = exports.with_deliverer(deliverer, storage.clone());
        }
        let (event_tx, _) = broadcast::channel(100);

        Ok(Self {
            config: Arc::new(config),
            ingest: IngestService::new(store.clone()),
            exports,
            store,
            storage,
            event_tx,
        })
    }

    /// Subscribe to server events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event
    pub fn broadcast(&self, event: ServerEvent) {
        // Ignore errors (no subscribers)
        let _ = self.event_tx.send(event);
    }
}

fn deliverer(config: &DeliveryConfig) -> Result<Arc<dyn Deliverer>> {
    Ok(match config {
        DeliveryConfig::Webhook { url } => Arc::new(WebhookDeliverer::new(url.clone())),
        DeliveryConfig::Smtp(settings) => Arc::new(
            SmtpDeliverer::new(settings).context("Failed to set up SMTP delivery")?,
        ),
    })
}
