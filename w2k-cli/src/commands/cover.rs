//! Cover command implementation

use super::Library;
use anyhow::{Context, Result};
use std::path::Path;
use w2k_core::{BookId, Cover, Store};

fn mime_for_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Set a book's cover from an image file
pub async fn cover(library: &Library, book_id: u64, image: &Path) -> Result<()> {
    let data = std::fs::read(image)
        .with_context(|| format!("Failed to read image: {}", image.display()))?;

    let cover = match mime_for_extension(image) {
        Some(mime) => Cover::new(mime, data),
        None => Cover::sniffed(data),
    };
    let mime = cover.mime_type.clone();

    library
        .store
        .update_cover(BookId(book_id), cover)
        .await
        .with_context(|| format!("Failed to set cover of book {}", book_id))?;

    println!("Set {} cover on book {}", mime, book_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_for_extension(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_extension(Path::new("cover")), None);
    }
}
