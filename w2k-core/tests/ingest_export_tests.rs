//! Ingestion and export tests for w2k-core
//!
//! These exercise the public API end to end: payloads go through the
//! ingestion service into a catalog store, exports go through the queue into
//! the EPUB packager.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use w2k_core::storage::LocalStorage;
use w2k_core::{
    CatalogStore, ChapterPayload, Cover, EpubPackager, ExportEvent, ExportQueue, IngestService,
    JobStatus, Store, W2kError,
};

// =============================================================================
// Helpers
// =============================================================================

fn payload(book: &str, number: i64) -> ChapterPayload {
    ChapterPayload {
        book_name: book.to_string(),
        book_id: None,
        chapter_name: format!("Chapter {}", number),
        number_in_book: number,
        author: Some("Er Gen".to_string()),
        translator: Some("Deathblade".to_string()),
        content: format!("<p>Content of chapter {}</p>", number),
    }
}

struct Harness {
    store: Arc<CatalogStore>,
    ingest: IngestService,
    exports: ExportQueue,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(LocalStorage::new(dir.path()));
    let store = Arc::new(CatalogStore::open(provider.clone()).await.unwrap());
    let packager = Arc::new(EpubPackager::new(provider));
    Harness {
        ingest: IngestService::new(store.clone()),
        exports: ExportQueue::new(store.clone(), packager),
        store,
        _dir: dir,
    }
}

async fn wait_for_outcome(
    rx: &mut tokio::sync::broadcast::Receiver<ExportEvent>,
) -> ExportEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("export did not finish in time")
            .unwrap();
        if matches!(event, ExportEvent::Packaged { .. } | ExportEvent::Failed { .. }) {
            return event;
        }
    }
}

// =============================================================================
// Ingestion properties
// =============================================================================

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let h = harness().await;

    let first = h.ingest.ingest(&payload("Renegade Immortal", 1)).await.unwrap();
    let second = h.ingest.ingest(&payload("Renegade Immortal", 1)).await.unwrap();

    assert_eq!(first, second);
    let book = h.store.get_book(first.book_id).await.unwrap().unwrap();
    assert_eq!(book.chapter_count, 1);
    assert_eq!(h.store.list_chapters(first.book_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_chapter_count_tracks_distinct_numbers() {
    let h = harness().await;

    for n in [3, 1, 3, 2, 1, 7] {
        h.ingest.ingest(&payload("Out Of Order", n)).await.unwrap();
    }

    let books = h.store.list_books().await.unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].chapter_count, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_shares_one_book() {
    let h = harness().await;
    let ingest = h.ingest.clone();

    let mut handles = Vec::new();
    for n in 1..=8 {
        let ingest = ingest.clone();
        handles.push(tokio::spawn(async move {
            ingest.ingest(&payload("X", n)).await
        }));
    }
    // Same key twice, concurrently
    for _ in 0..4 {
        let ingest = ingest.clone();
        handles.push(tokio::spawn(async move {
            ingest.ingest(&payload("X", 1)).await
        }));
    }

    let mut book_ids = Vec::new();
    for handle in handles {
        book_ids.push(handle.await.unwrap().unwrap().book_id);
    }
    book_ids.dedup();
    assert_eq!(book_ids.len(), 1);

    let books = h.store.list_books().await.unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].chapter_count, 8);
}

#[tokio::test]
async fn test_invalid_payload_is_rejected() {
    let h = harness().await;
    let mut bad = payload("Book", 1);
    bad.chapter_name = String::new();

    assert!(matches!(
        h.ingest.ingest(&bad).await,
        Err(W2kError::InvalidPayload(_))
    ));
    assert!(h.store.list_books().await.unwrap().is_empty());
}

// =============================================================================
// Export properties
// =============================================================================

#[tokio::test]
async fn test_inverted_range_is_invalid() {
    let h = harness().await;
    let ingested = h.ingest.ingest(&payload("Book", 1)).await.unwrap();

    assert!(matches!(
        h.exports.request_export(ingested.book_id, 5, 3).await,
        Err(W2kError::InvalidRange { from: 5, to: 3 })
    ));
    assert!(h.store.list_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_export_with_gaps_produces_ordered_epub() {
    let h = harness().await;
    let mut book_id = None;
    for n in [5, 1, 4, 2] {
        book_id = Some(h.ingest.ingest(&payload("Gapped", n)).await.unwrap().book_id);
    }
    let book_id = book_id.unwrap();

    let mut events = h.exports.subscribe();
    let job = h.exports.request_export(book_id, 1, 5).await.unwrap();
    assert_eq!(job.status, JobStatus::Accepted);
    assert_eq!(job.chapters, vec![1, 2, 4, 5]);

    let artifact = match wait_for_outcome(&mut events).await {
        ExportEvent::Packaged { job_id, artifact } => {
            assert_eq!(job_id, job.id);
            artifact
        }
        other => panic!("export failed: {:?}", other),
    };

    let epub = h.store.provider().read(&artifact).await.unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(epub)).unwrap();
    let mut order = Vec::new();
    for slot in 1..=4 {
        let name = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .find(|n| n.ends_with(&format!("chapter_{}.xhtml", slot)))
            .unwrap();
        let mut text = String::new();
        archive.by_name(&name).unwrap().read_to_string(&mut text).unwrap();
        let number = [1, 2, 4, 5]
            .into_iter()
            .find(|n| text.contains(&format!("Content of chapter {}<", n)))
            .unwrap();
        order.push(number);
    }
    assert_eq!(order, vec![1, 2, 4, 5]);
}

#[tokio::test]
async fn test_empty_range_is_rejected() {
    let h = harness().await;
    let ingested = h.ingest.ingest(&payload("Sparse", 1)).await.unwrap();

    let job = h
        .exports
        .request_export(ingested.book_id, 2, 9)
        .await
        .unwrap();
    assert!(matches!(job.status, JobStatus::Rejected { .. }));
    assert!(job.status.reason().is_some());

    let jobs = h.exports.list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].artifact.is_none());
}

#[tokio::test]
async fn test_snapshot_excludes_later_chapters() {
    let h = harness().await;
    let ingested = h.ingest.ingest(&payload("Growing", 1)).await.unwrap();

    let job = h
        .exports
        .request_export(ingested.book_id, 1, 3)
        .await
        .unwrap();
    h.ingest.ingest(&payload("Growing", 2)).await.unwrap();

    let stored = h.exports.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.chapters, vec![1]);
}

#[tokio::test]
async fn test_stored_cover_reaches_epub() {
    let h = harness().await;
    let ingested = h.ingest.ingest(&payload("Covered", 1)).await.unwrap();
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    h.store
        .update_cover(ingested.book_id, Cover::sniffed(png.clone()))
        .await
        .unwrap();

    let mut events = h.exports.subscribe();
    h.exports
        .request_export(ingested.book_id, 1, 1)
        .await
        .unwrap();
    let artifact = match wait_for_outcome(&mut events).await {
        ExportEvent::Packaged { artifact, .. } => artifact,
        other => panic!("export failed: {:?}", other),
    };

    let epub = h.store.provider().read(&artifact).await.unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(epub)).unwrap();
    let image = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .find(|n| n.ends_with("cover.png"))
        .expect("cover image missing from EPUB");
    let mut data = Vec::new();
    archive.by_name(&image).unwrap().read_to_end(&mut data).unwrap();
    assert_eq!(data, png);
}
