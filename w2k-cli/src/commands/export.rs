//! Export command implementation

use super::Library;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use w2k_core::{BookId, EpubPackager, ExportEvent, ExportQueue, JobStatus};

/// Export a chapter range of a book to an EPUB file
pub async fn export(library: &Library, book_id: u64, from: i64, to: i64, output: &Path) -> Result<()> {
    let packager = Arc::new(EpubPackager::new(library.storage.clone()));
    let queue = ExportQueue::new(library.store.clone(), packager);
    let mut events = queue.subscribe();

    let job = queue.request_export(BookId(book_id), from, to).await?;
    if let JobStatus::Rejected { reason } = &job.status {
        bail!("Export {} rejected: {}", job.id, reason);
    }
    if !job.is_complete() {
        println!(
            "Range {} has gaps, exporting chapters {:?}",
            job.range, job.chapters
        );
    }

    let artifact = loop {
        match events.recv().await {
            Ok(ExportEvent::Packaged { job_id, artifact }) if job_id == job.id => break artifact,
            Ok(ExportEvent::Failed { job_id, reason }) if job_id == job.id => {
                bail!("Export {} failed: {}", job_id, reason)
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} export events", skipped);
                continue;
            }
            Err(RecvError::Closed) => bail!("Export queue closed before job {} finished", job.id),
        }
    };

    let data = library.storage.read(&artifact).await?;
    std::fs::write(output, &data)
        .with_context(|| format!("Failed to write output file: {}", output.display()))?;

    println!(
        "Exported {} chapters to {}",
        job.chapters.len(),
        output.display()
    );
    Ok(())
}
