//! Chapters command implementation

use super::Library;
use anyhow::{Context, Result};
use w2k_core::{BookId, Store};

/// List the chapters of a book
pub async fn chapters(library: &Library, book_id: u64, json: bool) -> Result<()> {
    let chapters = library
        .store
        .list_chapters(BookId(book_id))
        .await
        .with_context(|| format!("Failed to list chapters of book {}", book_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chapters)?);
        return Ok(());
    }

    for chapter in &chapters {
        println!("{:>6}  {}", chapter.number_in_book, chapter.name);
    }
    println!("{} chapters", chapters.len());

    Ok(())
}
