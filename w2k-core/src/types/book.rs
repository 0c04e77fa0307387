//! The Book type - the aggregate root owning chapters

use super::CoverRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned book identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub u64);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A serialized novel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    /// Unique identifier, assigned on first creation
    pub id: BookId,

    /// Book name; the natural key used when ingesting by name
    pub name: String,

    /// Original author
    pub author: Option<String>,

    /// Translator, for translated novels
    pub translator: Option<String>,

    /// Stored cover image, if one was uploaded
    pub cover: Option<CoverRef>,

    /// Number of chapters currently owned by this book.
    /// Maintained by the store, never set by callers.
    pub chapter_count: u32,

    /// When the book was first seen
    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Create a new book with no chapters
    pub fn new(id: BookId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            author: None,
            translator: None,
            cover: None,
            chapter_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Set the author
    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    /// Set the translator
    pub fn with_translator(mut self, translator: Option<String>) -> Self {
        self.translator = translator;
        self
    }

    /// Whether a cover has been uploaded
    pub fn has_cover(&self) -> bool {
        self.cover.is_some()
    }
}
