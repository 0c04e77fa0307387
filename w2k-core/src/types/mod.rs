//! Core entity types: books, chapters and export jobs

mod book;
mod chapter;
mod cover;
mod export;

pub use book::{Book, BookId};
pub use chapter::{chapter_digest, Chapter, ChapterId, ChapterSummary};
pub use cover::{sniff_mime, Cover, CoverRef};
pub use export::{ChapterRange, ExportJob, JobId, JobStatus};
