//! Chapter types representing a single numbered unit of a book

use super::BookId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Store-assigned chapter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub u64);

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chapter metadata without its body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterSummary {
    pub id: ChapterId,

    /// Owning book
    pub book_id: BookId,

    /// Position in the book, unique per book, starting at 1
    pub number_in_book: u32,

    /// Chapter title
    pub name: String,

    /// SHA-256 of title and content, hex encoded
    pub digest: String,

    /// Last time the chapter was written
    pub updated_at: DateTime<Utc>,
}

impl ChapterSummary {
    /// Storage key of the chapter body. Keyed by digest so that an overwrite
    /// lands in a fresh blob and only the catalog commit switches it over.
    pub fn content_key(&self) -> String {
        format!("chapters/{}-{}.html", self.id, self.digest)
    }
}

/// A chapter with its content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    #[serde(flatten)]
    pub summary: ChapterSummary,

    /// Extracted chapter markup
    pub content: String,
}

impl Chapter {
    pub fn id(&self) -> ChapterId {
        self.summary.id
    }

    pub fn book_id(&self) -> BookId {
        self.summary.book_id
    }

    pub fn number_in_book(&self) -> u32 {
        self.summary.number_in_book
    }

    pub fn name(&self) -> &str {
        &self.summary.name
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) {} #{}",
            self.summary.book_id, self.summary.name, self.summary.number_in_book
        )
    }
}

/// Digest identifying a chapter's title and content
pub fn chapter_digest(name: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
