//! Ingestion of scraped chapters into the store

use crate::error::{Result, W2kError};
use crate::store::Store;
use crate::types::{BookId, ChapterId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A chapter as sent by the scraper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPayload {
    /// Name of the owning book; the natural key when `book_id` is absent
    #[serde(alias = "book", default)]
    pub book_name: String,

    /// Explicit target book, bypassing the lookup by name
    #[serde(default)]
    pub book_id: Option<BookId>,

    #[serde(alias = "name")]
    pub chapter_name: String,

    /// Position in the book, must be positive
    pub number_in_book: i64,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub translator: Option<String>,

    pub content: String,
}

impl fmt::Display for ChapterPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} #{}",
            self.book_name, self.chapter_name, self.number_in_book
        )
    }
}

/// Validated payload, ready to be written
struct ValidChapter<'a> {
    book_name: &'a str,
    chapter_name: &'a str,
    number_in_book: u32,
    author: Option<&'a str>,
    translator: Option<&'a str>,
}

impl ChapterPayload {
    fn validate(&self) -> Result<ValidChapter<'_>> {
        let book_name = self.book_name.trim();
        if book_name.is_empty() && self.book_id.is_none() {
            return Err(W2kError::InvalidPayload("book name is empty".to_string()));
        }

        let chapter_name = self.chapter_name.trim();
        if chapter_name.is_empty() {
            return Err(W2kError::InvalidPayload("chapter name is empty".to_string()));
        }

        let number_in_book = u32::try_from(self.number_in_book)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                W2kError::InvalidPayload(format!(
                    "number_in_book must be positive, got {}",
                    self.number_in_book
                ))
            })?;

        if self.content.trim().is_empty() {
            return Err(W2kError::InvalidPayload("content is empty".to_string()));
        }

        Ok(ValidChapter {
            book_name,
            chapter_name,
            number_in_book,
            author: non_blank(&self.author),
            translator: non_blank(&self.translator),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Identifiers of an ingested chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingested {
    pub book_id: BookId,
    pub chapter_id: ChapterId,

    /// Validated position of the chapter in its book
    pub number_in_book: u32,
}

/// Turns scraped chapter payloads into store updates
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn Store>,
}

impl IngestService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validate and commit one chapter.
    ///
    /// Re-ingesting a chapter at the same position overwrites it. Store
    /// failures are returned as-is; retrying is up to the caller.
    pub async fn ingest(&self, payload: &ChapterPayload) -> Result<Ingested> {
        let chapter = payload.validate()?;

        let book_id = match payload.book_id {
            Some(id) => {
                self.store
                    .get_book(id)
                    .await?
                    .ok_or_else(|| W2kError::NotFound(format!("book {}", id)))?
                    .id
            }
            None => {
                self.store
                    .upsert_book(chapter.book_name, chapter.author, chapter.translator)
                    .await?
            }
        };

        let chapter_id = self
            .store
            .upsert_chapter(
                book_id,
                chapter.number_in_book,
                chapter.chapter_name,
                &payload.content,
            )
            .await?;

        tracing::info!(%book_id, %chapter_id, "Ingested chapter: {}", payload);

        Ok(Ingested {
            book_id,
            chapter_id,
            number_in_book: chapter.number_in_book,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CatalogStore;

    fn payload(book: &str, name: &str, number: i64) -> ChapterPayload {
        ChapterPayload {
            book_name: book.to_string(),
            book_id: None,
            chapter_name: name.to_string(),
            number_in_book: number,
            author: None,
            translator: None,
            content: format!("<p>{}</p>", name),
        }
    }

    fn service() -> (IngestService, Arc<CatalogStore>) {
        let store = Arc::new(CatalogStore::in_memory());
        (IngestService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_invalid_payloads_write_nothing() {
        let (service, store) = service();

        let mut empty_content = payload("Book", "One", 1);
        empty_content.content = "  ".to_string();

        for bad in [
            payload("", "One", 1),
            payload("Book", " ", 1),
            payload("Book", "One", 0),
            payload("Book", "One", -4),
            payload("Book", "One", i64::from(u32::MAX) + 1),
            empty_content,
        ] {
            let err = service.ingest(&bad).await.unwrap_err();
            assert!(matches!(err, W2kError::InvalidPayload(_)), "{}", bad);
        }

        assert!(store.list_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_author_only_set_on_creation() {
        let (service, store) = service();

        let mut first = payload("Stellar Transformations", "One", 1);
        first.author = Some("I Eat Tomatoes".to_string());
        let mut second = payload("Stellar Transformations", "Two", 2);
        second.author = Some("Impostor".to_string());
        second.translator = Some("Someone".to_string());

        let a = service.ingest(&first).await.unwrap();
        let b = service.ingest(&second).await.unwrap();
        assert_eq!(a.book_id, b.book_id);

        let book = store.get_book(a.book_id).await.unwrap().unwrap();
        assert_eq!(book.author.as_deref(), Some("I Eat Tomatoes"));
        assert_eq!(book.translator, None);
        assert_eq!(book.chapter_count, 2);
    }

    #[tokio::test]
    async fn test_explicit_book_id() {
        let (service, _store) = service();
        let created = service.ingest(&payload("Named", "One", 1)).await.unwrap();

        let mut by_id = payload("", "Two", 2);
        by_id.book_id = Some(created.book_id);
        let ingested = service.ingest(&by_id).await.unwrap();
        assert_eq!(ingested.book_id, created.book_id);
        assert_eq!(ingested.number_in_book, 2);

        by_id.book_id = Some(BookId(404));
        assert!(matches!(
            service.ingest(&by_id).await,
            Err(W2kError::NotFound(_))
        ));
    }

    #[test]
    fn test_original_field_names_accepted() {
        let payload: ChapterPayload = serde_json::from_str(
            r#"{"book":"Wu Dong Qian Kun","name":"Chapter 1","number_in_book":1,"content":"<p>x</p>"}"#,
        )
        .unwrap();
        assert_eq!(payload.book_name, "Wu Dong Qian Kun");
        assert_eq!(payload.chapter_name, "Chapter 1");
        assert!(payload.author.is_none());
    }
}
