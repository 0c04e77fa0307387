//! EPUB packager writing artifacts through a storage provider

use super::{PackageRequest, Packager};
use crate::error::ConversionError;
use crate::storage::StorageProvider;
use crate::types::{Book, Chapter, Cover};
use async_trait::async_trait;
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use std::sync::Arc;

const STYLESHEET: &str = r#"body { margin: 0 5%; text-align: justify; }
h1 { text-align: center; margin-top: 30%; }
h2 { text-align: center; margin: 1em 0 1.5em 0; }
p { text-indent: 1.5em; margin: 0.3em 0; }
img.cover { display: block; max-width: 100%; max-height: 100%; margin: 0 auto; }
"#;

/// Packages chapters into an EPUB 3 file
pub struct EpubPackager {
    storage: Arc<dyn StorageProvider>,
    language: String,
}

impl EpubPackager {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            storage,
            language: "en".to_string(),
        }
    }

    /// Set the language tag written to the package metadata
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Storage key used for a job's artifact
    pub fn artifact_path(job_id: impl std::fmt::Display) -> String {
        format!("exports/{}.epub", job_id)
    }

    /// Build the EPUB in memory
    pub fn build(
        book: &Book,
        cover: Option<&Cover>,
        chapters: &[Chapter],
        language: &str,
    ) -> Result<Vec<u8>, ConversionError> {
        let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(|e| {
            ConversionError::EncodingFailed(format!("Failed to create zip: {}", e))
        })?)
        .map_err(|e| {
            ConversionError::EncodingFailed(format!("Failed to create EPUB builder: {}", e))
        })?;

        builder.epub_version(EpubVersion::V30);
        builder
            .metadata("title", &book.name)
            .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        builder
            .metadata("lang", language)
            .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        for creator in [&book.author, &book.translator].into_iter().flatten() {
            builder
                .metadata("author", creator)
                .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        }
        builder
            .stylesheet(STYLESHEET.as_bytes())
            .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;

        if let Some(cover) = cover {
            let filename = format!("cover.{}", cover.extension());
            builder
                .add_cover_image(&filename, cover.data.as_slice(), &cover.mime_type)
                .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
            let page = wrap_xhtml(
                "Cover",
                &format!(r#"<img class="cover" src="{}" alt="Cover"/>"#, filename),
            );
            builder
                .add_content(
                    EpubContent::new("cover.xhtml", page.as_bytes())
                        .title("Cover")
                        .reftype(ReferenceType::Cover),
                )
                .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        }

        let title_page = wrap_xhtml(
            &book.name,
            &format!("<h1>{}</h1>", escape_html(&book.name)),
        );
        builder
            .add_content(
                EpubContent::new("title.xhtml", title_page.as_bytes())
                    .title(&book.name)
                    .reftype(ReferenceType::TitlePage),
            )
            .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        builder.inline_toc();

        for (i, chapter) in chapters.iter().enumerate() {
            let body = format!("<h2>{}</h2>\n{}", escape_html(chapter.name()), chapter.content);
            let xhtml = wrap_xhtml(chapter.name(), &body);
            let filename = format!("chapter_{}.xhtml", i + 1);

            builder
                .add_content(
                    EpubContent::new(&filename, xhtml.as_bytes())
                        .title(chapter.name())
                        .reftype(ReferenceType::Text),
                )
                .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        }

        let mut output = Vec::new();
        builder
            .generate(&mut output)
            .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        Ok(output)
    }
}

#[async_trait]
impl Packager for EpubPackager {
    async fn package(&self, request: PackageRequest) -> Result<String, ConversionError> {
        let path = Self::artifact_path(request.job_id);
        let language = self.language.clone();

        // Zipping is CPU-bound, keep it off the async workers
        let data = tokio::task::spawn_blocking(move || {
            Self::build(&request.book, request.cover.as_ref(), &request.chapters, &language)
        })
        .await
        .map_err(|e| ConversionError::EncodingFailed(format!("Task failed: {}", e)))??;

        self.storage
            .write(&path, data)
            .await
            .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
        Ok(path)
    }
}

/// Wrap a body fragment into a standalone XHTML document
fn wrap_xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
    <title>{}</title>
    <meta charset="UTF-8"/>
    <link rel="stylesheet" type="text/css" href="stylesheet.css"/>
</head>
<body>
{}
</body>
</html>"#,
        escape_html(title),
        body
    )
}

/// Escape HTML special characters
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
