//! Durable keyed storage for books, chapters and export jobs
//!
//! The [`Store`] trait is what the ingestion service and the export engine
//! talk to. [`CatalogStore`] implements it on top of any
//! [`StorageProvider`]: the catalog index is kept in memory behind a lock and
//! written back as `catalog.json` on every mutation. Chapter bodies and cover
//! images are stored as individual content-addressed blobs, so a write never
//! touches a blob the committed catalog still points at.

mod catalog;

pub use catalog::{Catalog, CatalogSnapshot, ChapterWrite};

use crate::error::StorageError;
use crate::storage::{MemoryStorage, StorageProvider, StorageResult};
use crate::types::{
    chapter_digest, Book, BookId, Chapter, ChapterId, ChapterSummary, Cover, CoverRef, ExportJob,
    JobId,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Path of the serialized catalog inside the provider
pub const CATALOG_PATH: &str = "catalog.json";

/// Storage contract used by the ingestion service and the export engine.
/// Every mutation is durable once its future resolves.
#[async_trait]
pub trait Store: Send + Sync {
    /// Return the id of the book named `name`, creating it if needed
    async fn upsert_book(
        &self,
        name: &str,
        author: Option<&str>,
        translator: Option<&str>,
    ) -> StorageResult<BookId>;

    /// Insert or overwrite the chapter at `(book_id, number_in_book)`
    async fn upsert_chapter(
        &self,
        book_id: BookId,
        number_in_book: u32,
        name: &str,
        content: &str,
    ) -> StorageResult<ChapterId>;

    async fn get_book(&self, id: BookId) -> StorageResult<Option<Book>>;

    async fn list_books(&self) -> StorageResult<Vec<Book>>;

    async fn get_chapter(&self, id: ChapterId) -> StorageResult<Option<Chapter>>;

    /// Chapter metadata of a book, ascending by number
    async fn list_chapters(&self, book_id: BookId) -> StorageResult<Vec<ChapterSummary>>;

    /// Chapters with `from <= number_in_book <= to`, ascending by number
    async fn list_chapters_in_range(
        &self,
        book_id: BookId,
        from: u32,
        to: u32,
    ) -> StorageResult<Vec<Chapter>>;

    async fn update_cover(&self, book_id: BookId, cover: Cover) -> StorageResult<()>;

    /// Cover image of a book, None if no cover was uploaded
    async fn get_cover(&self, book_id: BookId) -> StorageResult<Option<Cover>>;

    /// Insert or replace an export job
    async fn save_job(&self, job: &ExportJob) -> StorageResult<()>;

    async fn get_job(&self, id: JobId) -> StorageResult<Option<ExportJob>>;

    /// Jobs ordered by creation time
    async fn list_jobs(&self) -> StorageResult<Vec<ExportJob>>;
}

/// Store backed by a catalog index and a blob provider
pub struct CatalogStore {
    provider: Arc<dyn StorageProvider>,
    catalog: RwLock<Catalog>,
}

impl CatalogStore {
    /// Open the store, loading an existing catalog from the provider
    pub async fn open(provider: Arc<dyn StorageProvider>) -> StorageResult<Self> {
        let catalog = if provider.exists(CATALOG_PATH).await? {
            let data = provider.read(CATALOG_PATH).await?;
            let snapshot: CatalogSnapshot = serde_json::from_slice(&data)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            Catalog::from_snapshot(snapshot)
        } else {
            Catalog::new()
        };

        tracing::debug!(
            books = catalog.books().count(),
            "Opened catalog store"
        );

        Ok(Self {
            provider,
            catalog: RwLock::new(catalog),
        })
    }

    /// Store kept entirely in memory
    pub fn in_memory() -> Self {
        Self {
            provider: Arc::new(MemoryStorage::new()),
            catalog: RwLock::new(Catalog::new()),
        }
    }

    /// Blob provider the store writes through
    pub fn provider(&self) -> Arc<dyn StorageProvider> {
        Arc::clone(&self.provider)
    }

    async fn persist(&self, catalog: &Catalog) -> StorageResult<()> {
        let data = serde_json::to_vec(&catalog.to_snapshot())
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        self.provider.write(CATALOG_PATH, data).await
    }

    async fn load_content(&self, summary: ChapterSummary) -> StorageResult<Chapter> {
        let bytes = self.provider.read(&summary.content_key()).await?;
        let content = String::from_utf8(bytes)
            .map_err(|e| StorageError::Corrupt(format!("chapter {}: {}", summary.id, e)))?;
        Ok(Chapter { summary, content })
    }
}

#[async_trait]
impl Store for CatalogStore {
    async fn upsert_book(
        &self,
        name: &str,
        author: Option<&str>,
        translator: Option<&str>,
    ) -> StorageResult<BookId> {
        let mut catalog = self.catalog.write().await;
        if let Some(book) = catalog.book_by_name(name) {
            return Ok(book.id);
        }

        let mut next = catalog.clone();
        let (id, _) = next.upsert_book(name, author, translator);
        self.persist(&next).await?;
        *catalog = next;

        tracing::info!(book_id = %id, name, "Created book");
        Ok(id)
    }

    async fn upsert_chapter(
        &self,
        book_id: BookId,
        number_in_book: u32,
        name: &str,
        content: &str,
    ) -> StorageResult<ChapterId> {
        let digest = chapter_digest(name, content);
        let mut catalog = self.catalog.write().await;

        let mut next = catalog.clone();
        let write = next
            .upsert_chapter(book_id, number_in_book, name, &digest)
            .ok_or_else(|| StorageError::NotFound(format!("book {}", book_id)))?;

        if let ChapterWrite::Unchanged(id) = write {
            tracing::debug!(chapter_id = %id, number_in_book, "Chapter unchanged, skipping write");
            return Ok(id);
        }

        let key = next
            .chapter(write.id())
            .map(ChapterSummary::content_key)
            .ok_or_else(|| StorageError::NotFound(format!("chapter {}", write.id())))?;

        // Body first: a failure between the two writes leaves an unreferenced blob at worst
        self.provider.write(&key, content.as_bytes().to_vec()).await?;
        self.persist(&next).await?;
        *catalog = next;

        Ok(write.id())
    }

    async fn get_book(&self, id: BookId) -> StorageResult<Option<Book>> {
        Ok(self.catalog.read().await.book(id).cloned())
    }

    async fn list_books(&self) -> StorageResult<Vec<Book>> {
        Ok(self.catalog.read().await.books().cloned().collect())
    }

    async fn get_chapter(&self, id: ChapterId) -> StorageResult<Option<Chapter>> {
        let catalog = self.catalog.read().await;
        match catalog.chapter(id).cloned() {
            Some(summary) => Ok(Some(self.load_content(summary).await?)),
            None => Ok(None),
        }
    }

    async fn list_chapters(&self, book_id: BookId) -> StorageResult<Vec<ChapterSummary>> {
        let catalog = self.catalog.read().await;
        if catalog.book(book_id).is_none() {
            return Err(StorageError::NotFound(format!("book {}", book_id)));
        }
        Ok(catalog.chapters_of(book_id).cloned().collect())
    }

    async fn list_chapters_in_range(
        &self,
        book_id: BookId,
        from: u32,
        to: u32,
    ) -> StorageResult<Vec<Chapter>> {
        // Held for the whole scan so the result is a consistent snapshot
        let catalog = self.catalog.read().await;
        let summaries: Vec<ChapterSummary> =
            catalog.chapters_in_range(book_id, from, to).cloned().collect();

        let mut chapters = Vec::with_capacity(summaries.len());
        for summary in summaries {
            chapters.push(self.load_content(summary).await?);
        }
        Ok(chapters)
    }

    async fn update_cover(&self, book_id: BookId, cover: Cover) -> StorageResult<()> {
        let mut catalog = self.catalog.write().await;
        let mut next = catalog.clone();
        let cover_ref = CoverRef {
            mime_type: cover.mime_type.clone(),
            key: cover.storage_key(book_id),
        };
        let key = cover_ref.key.clone();
        if !next.set_cover(book_id, cover_ref) {
            return Err(StorageError::NotFound(format!("book {}", book_id)));
        }

        self.provider.write(&key, cover.data).await?;
        self.persist(&next).await?;
        *catalog = next;
        Ok(())
    }

    async fn get_cover(&self, book_id: BookId) -> StorageResult<Option<Cover>> {
        let catalog = self.catalog.read().await;
        let book = catalog
            .book(book_id)
            .ok_or_else(|| StorageError::NotFound(format!("book {}", book_id)))?;
        match &book.cover {
            Some(cover) => {
                let data = self.provider.read(&cover.key).await?;
                Ok(Some(Cover::new(cover.mime_type.clone(), data)))
            }
            None => Ok(None),
        }
    }

    async fn save_job(&self, job: &ExportJob) -> StorageResult<()> {
        let mut catalog = self.catalog.write().await;
        let mut next = catalog.clone();
        next.put_job(job.clone());
        self.persist(&next).await?;
        *catalog = next;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> StorageResult<Option<ExportJob>> {
        Ok(self.catalog.read().await.job(id).cloned())
    }

    async fn list_jobs(&self) -> StorageResult<Vec<ExportJob>> {
        Ok(self
            .catalog
            .read()
            .await
            .jobs()
            .into_iter()
            .cloned()
            .collect())
    }
}
