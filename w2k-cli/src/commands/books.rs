//! Books command implementation

use super::Library;
use anyhow::Result;
use serde::Serialize;
use w2k_core::{Book, BookId, Store};

/// Book listing output
#[derive(Serialize)]
struct BookInfo {
    id: BookId,
    name: String,
    author: Option<String>,
    translator: Option<String>,
    chapters: u32,
    has_cover: bool,
}

impl From<Book> for BookInfo {
    fn from(book: Book) -> Self {
        Self {
            has_cover: book.has_cover(),
            id: book.id,
            name: book.name,
            author: book.author,
            translator: book.translator,
            chapters: book.chapter_count,
        }
    }
}

/// List books, sorted by name
pub async fn books(library: &Library, json: bool) -> Result<()> {
    let mut books: Vec<BookInfo> = library
        .store
        .list_books()
        .await?
        .into_iter()
        .map(BookInfo::from)
        .collect();
    books.sort_by(|a, b| a.name.cmp(&b.name));

    if json {
        println!("{}", serde_json::to_string_pretty(&books)?);
        return Ok(());
    }

    if books.is_empty() {
        println!("No books in library");
        return Ok(());
    }

    for book in &books {
        let credits = match (&book.author, &book.translator) {
            (Some(author), Some(translator)) => format!(" by {} (tr. {})", author, translator),
            (Some(author), None) => format!(" by {}", author),
            (None, Some(translator)) => format!(" (tr. {})", translator),
            (None, None) => String::new(),
        };
        println!(
            "{:>4}  {}{}  [{} chapters]",
            book.id, book.name, credits, book.chapters
        );
    }

    Ok(())
}
