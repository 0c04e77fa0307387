//! In-memory catalog of books, chapter metadata and export jobs

use crate::types::{Book, BookId, ChapterId, ChapterSummary, CoverRef, ExportJob, JobId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Outcome of writing a chapter into the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterWrite {
    /// A new chapter was created
    Inserted(ChapterId),
    /// An existing chapter at the same position was overwritten
    Updated(ChapterId),
    /// The same title and content were already stored
    Unchanged(ChapterId),
}

impl ChapterWrite {
    pub fn id(&self) -> ChapterId {
        match *self {
            ChapterWrite::Inserted(id) | ChapterWrite::Updated(id) | ChapterWrite::Unchanged(id) => {
                id
            }
        }
    }
}

/// The indexed catalog. Content bodies are kept outside of it.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    next_book_id: u64,
    next_chapter_id: u64,
    books: BTreeMap<BookId, Book>,
    book_names: HashMap<String, BookId>,
    chapters: BTreeMap<ChapterId, ChapterSummary>,
    positions: BTreeMap<(BookId, u32), ChapterId>,
    jobs: HashMap<JobId, ExportJob>,
}

/// Serialized form of the catalog
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub next_book_id: u64,
    pub next_chapter_id: u64,
    pub books: Vec<Book>,
    pub chapters: Vec<ChapterSummary>,
    pub jobs: Vec<ExportJob>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the catalog and its indexes from a snapshot
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let mut catalog = Catalog {
            next_book_id: snapshot.next_book_id,
            next_chapter_id: snapshot.next_chapter_id,
            ..Default::default()
        };

        for book in snapshot.books {
            catalog.next_book_id = catalog.next_book_id.max(book.id.0);
            catalog.book_names.insert(book.name.clone(), book.id);
            catalog.books.insert(book.id, book);
        }
        for chapter in snapshot.chapters {
            catalog.next_chapter_id = catalog.next_chapter_id.max(chapter.id.0);
            catalog
                .positions
                .insert((chapter.book_id, chapter.number_in_book), chapter.id);
            catalog.chapters.insert(chapter.id, chapter);
        }
        for job in snapshot.jobs {
            catalog.jobs.insert(job.id, job);
        }

        catalog.recount();
        catalog
    }

    /// Produce the serialized form
    pub fn to_snapshot(&self) -> CatalogSnapshot {
        let mut jobs: Vec<ExportJob> = self.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);

        CatalogSnapshot {
            next_book_id: self.next_book_id,
            next_chapter_id: self.next_chapter_id,
            books: self.books.values().cloned().collect(),
            chapters: self.chapters.values().cloned().collect(),
            jobs,
        }
    }

    /// Recompute every book's chapter count from the position index
    fn recount(&mut self) {
        for book in self.books.values_mut() {
            book.chapter_count = 0;
        }
        for (book_id, _) in self.positions.keys() {
            if let Some(book) = self.books.get_mut(book_id) {
                book.chapter_count += 1;
            }
        }
    }

    pub fn book(&self, id: BookId) -> Option<&Book> {
        self.books.get(&id)
    }

    pub fn book_by_name(&self, name: &str) -> Option<&Book> {
        self.book_names.get(name).and_then(|id| self.books.get(id))
    }

    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    /// Return the id of the book with this name, creating it if needed.
    /// Author and translator are only used on creation.
    pub fn upsert_book(
        &mut self,
        name: &str,
        author: Option<&str>,
        translator: Option<&str>,
    ) -> (BookId, bool) {
        if let Some(id) = self.book_names.get(name) {
            return (*id, false);
        }

        self.next_book_id += 1;
        let id = BookId(self.next_book_id);
        let book = Book::new(id, name)
            .with_author(author.map(str::to_string))
            .with_translator(translator.map(str::to_string));
        self.book_names.insert(name.to_string(), id);
        self.books.insert(id, book);
        (id, true)
    }

    pub fn set_cover(&mut self, id: BookId, cover: CoverRef) -> bool {
        match self.books.get_mut(&id) {
            Some(book) => {
                book.cover = Some(cover);
                true
            }
            None => false,
        }
    }

    pub fn chapter(&self, id: ChapterId) -> Option<&ChapterSummary> {
        self.chapters.get(&id)
    }

    pub fn chapter_at(&self, book_id: BookId, number_in_book: u32) -> Option<&ChapterSummary> {
        self.positions
            .get(&(book_id, number_in_book))
            .and_then(|id| self.chapters.get(id))
    }

    /// Insert or overwrite the chapter at `(book_id, number_in_book)`.
    /// Returns None when the book does not exist.
    pub fn upsert_chapter(
        &mut self,
        book_id: BookId,
        number_in_book: u32,
        name: &str,
        digest: &str,
    ) -> Option<ChapterWrite> {
        if !self.books.contains_key(&book_id) {
            return None;
        }

        if let Some(id) = self.positions.get(&(book_id, number_in_book)).copied() {
            let summary = self.chapters.get_mut(&id)?;
            if summary.digest == digest && summary.name == name {
                return Some(ChapterWrite::Unchanged(id));
            }
            summary.name = name.to_string();
            summary.digest = digest.to_string();
            summary.updated_at = Utc::now();
            return Some(ChapterWrite::Updated(id));
        }

        self.next_chapter_id += 1;
        let id = ChapterId(self.next_chapter_id);
        self.chapters.insert(
            id,
            ChapterSummary {
                id,
                book_id,
                number_in_book,
                name: name.to_string(),
                digest: digest.to_string(),
                updated_at: Utc::now(),
            },
        );
        self.positions.insert((book_id, number_in_book), id);
        if let Some(book) = self.books.get_mut(&book_id) {
            book.chapter_count += 1;
        }
        Some(ChapterWrite::Inserted(id))
    }

    /// Chapters of a book with `from <= number_in_book <= to`, ascending
    pub fn chapters_in_range(
        &self,
        book_id: BookId,
        from: u32,
        to: u32,
    ) -> impl Iterator<Item = &ChapterSummary> {
        let bounds = if from <= to {
            Some((book_id, from)..=(book_id, to))
        } else {
            None
        };
        bounds
            .into_iter()
            .flat_map(move |range| self.positions.range(range))
            .filter_map(move |(_, id)| self.chapters.get(id))
    }

    /// All chapters of a book, ascending
    pub fn chapters_of(&self, book_id: BookId) -> impl Iterator<Item = &ChapterSummary> {
        self.chapters_in_range(book_id, 1, u32::MAX)
    }

    pub fn job(&self, id: JobId) -> Option<&ExportJob> {
        self.jobs.get(&id)
    }

    pub fn put_job(&mut self, job: ExportJob) {
        self.jobs.insert(job.id, job);
    }

    /// Jobs ordered by creation time
    pub fn jobs(&self) -> Vec<&ExportJob> {
        let mut jobs: Vec<&ExportJob> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}
