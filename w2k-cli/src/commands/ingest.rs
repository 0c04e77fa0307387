//! Ingest command implementation

use super::Library;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use w2k_core::{ChapterPayload, IngestService};

/// Either a single payload or an array of them
#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadFile {
    Many(Vec<ChapterPayload>),
    One(Box<ChapterPayload>),
}

fn read_payloads(path: &Path) -> Result<Vec<ChapterPayload>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: PayloadFile = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a chapter payload", path.display()))?;

    Ok(match parsed {
        PayloadFile::Many(payloads) => payloads,
        PayloadFile::One(payload) => vec![*payload],
    })
}

/// Ingest chapter payloads from JSON files
pub async fn ingest(library: &Library, files: &[PathBuf]) -> Result<()> {
    let mut payloads = Vec::new();
    for file in files {
        payloads.extend(read_payloads(file)?);
    }

    let service = IngestService::new(library.store.clone());

    let pb = ProgressBar::new(payloads.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?
            .progress_chars("##-"),
    );

    let mut books = BTreeSet::new();
    let mut chapters = 0usize;
    let mut errors = 0usize;

    for payload in &payloads {
        pb.set_message(payload.chapter_name.clone());
        match service.ingest(payload).await {
            Ok(ingested) => {
                books.insert(ingested.book_id);
                chapters += 1;
            }
            Err(e) => {
                errors += 1;
                tracing::error!("Failed to ingest {}: {}", payload, e);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    println!("Ingest complete:");
    println!("  Books:    {}", books.len());
    println!("  Chapters: {}", chapters);
    println!("  Errors:   {}", errors);

    if errors > 0 {
        bail!("Ingest completed with {} errors", errors);
    }

    Ok(())
}
