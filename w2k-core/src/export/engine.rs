//! The export queue engine

use super::{Deliverer, Delivery, PackageRequest, Packager};
use crate::error::{Result, W2kError};
use crate::storage::StorageProvider;
use crate::store::Store;
use crate::types::{BookId, ChapterRange, ExportJob, JobId, JobStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Reason recorded on jobs whose range matches no stored chapter
pub const NO_CHAPTERS_IN_RANGE: &str = "no chapters in range";

/// Job lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    /// The job was validated and handed to the packager
    Accepted {
        job_id: JobId,
        book_id: BookId,
        chapters: usize,
    },

    /// The job was rejected before dispatch
    Rejected { job_id: JobId, reason: String },

    /// The packager produced an artifact
    Packaged { job_id: JobId, artifact: String },

    /// The packager reported an error
    Failed { job_id: JobId, reason: String },

    /// The artifact was handed to the deliverer
    Delivered { job_id: JobId, via: String },

    /// The deliverer could not send the artifact. The job stays `Accepted`.
    DeliveryFailed { job_id: JobId, reason: String },
}

impl ExportEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            ExportEvent::Accepted { job_id, .. }
            | ExportEvent::Rejected { job_id, .. }
            | ExportEvent::Packaged { job_id, .. }
            | ExportEvent::Failed { job_id, .. }
            | ExportEvent::Delivered { job_id, .. }
            | ExportEvent::DeliveryFailed { job_id, .. } => *job_id,
        }
    }
}

/// Where packaged artifacts are sent, and where they are read from
#[derive(Clone)]
struct DeliveryTarget {
    deliverer: Arc<dyn Deliverer>,
    storage: Arc<dyn StorageProvider>,
}

/// Validates export requests, dispatches them and records their outcome
#[derive(Clone)]
pub struct ExportQueue {
    store: Arc<dyn Store>,
    packager: Arc<dyn Packager>,
    delivery: Option<DeliveryTarget>,
    events: broadcast::Sender<ExportEvent>,
}

impl ExportQueue {
    pub fn new(store: Arc<dyn Store>, packager: Arc<dyn Packager>) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            store,
            packager,
            delivery: None,
            events,
        }
    }

    /// Send every packaged artifact through `deliverer`. Artifacts are read
    /// back from `storage`, which must be the provider the packager writes to.
    pub fn with_deliverer(
        mut self,
        deliverer: Arc<dyn Deliverer>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        self.delivery = Some(DeliveryTarget { deliverer, storage });
        self
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: ExportEvent) {
        // Ignore errors (no subscribers)
        let _ = self.events.send(event);
    }

    /// Request an export of chapters `from..=to` of a book.
    ///
    /// Returns the job as soon as it is `Accepted` or `Rejected`; packaging
    /// runs in the background and reports through [`ExportQueue::mark_failed`]
    /// or [`ExportQueue::record_artifact`]. Gaps in the range are accepted,
    /// the job lists the chapters actually handed over. Bounds past the
    /// highest storable chapter number are valid and simply match nothing.
    pub async fn request_export(&self, book_id: BookId, from: i64, to: i64) -> Result<ExportJob> {
        let range = u64::try_from(from)
            .ok()
            .zip(u64::try_from(to).ok())
            .and_then(|(from, to)| ChapterRange::new(from, to))
            .ok_or(W2kError::InvalidRange { from, to })?;

        let book = self
            .store
            .get_book(book_id)
            .await?
            .ok_or_else(|| W2kError::NotFound(format!("book {}", book_id)))?;

        let mut job = ExportJob::new(book_id, range);
        let chapters = match range.storable() {
            Some((first, last)) => self.store.list_chapters_in_range(book_id, first, last).await?,
            None => Vec::new(),
        };

        if chapters.is_empty() {
            job.status = JobStatus::Rejected {
                reason: NO_CHAPTERS_IN_RANGE.to_string(),
            };
            job.finished_at = Some(Utc::now());
            self.store.save_job(&job).await?;

            tracing::warn!(job_id = %job.id, %book_id, %range, "Rejected export: {}", NO_CHAPTERS_IN_RANGE);
            self.broadcast(ExportEvent::Rejected {
                job_id: job.id,
                reason: NO_CHAPTERS_IN_RANGE.to_string(),
            });
            return Ok(job);
        }

        let cover = if book.has_cover() {
            self.store.get_cover(book_id).await?
        } else {
            None
        };

        job.chapters = chapters.iter().map(|c| c.number_in_book()).collect();
        job.status = JobStatus::Accepted;
        self.store.save_job(&job).await?;

        if !job.is_complete() {
            tracing::info!(
                job_id = %job.id,
                %range,
                found = job.chapters.len(),
                "Range has gaps, exporting available chapters"
            );
        }
        tracing::info!(job_id = %job.id, %book_id, %range, "Accepted export of '{}'", book.name);
        self.broadcast(ExportEvent::Accepted {
            job_id: job.id,
            book_id,
            chapters: chapters.len(),
        });

        let request = PackageRequest {
            job_id: job.id,
            book,
            cover,
            chapters,
        };
        let queue = self.clone();
        tokio::spawn(async move {
            queue.dispatch(request).await;
        });

        Ok(job)
    }

    async fn dispatch(&self, request: PackageRequest) {
        let job_id = request.job_id;
        let book_name = request.book.name.clone();
        if let Err(e) = self.mark_started(job_id).await {
            tracing::warn!(%job_id, "Failed to record packaging start: {}", e);
        }

        let outcome = match self.packager.package(request).await {
            Ok(artifact) => self.record_artifact(job_id, artifact).await,
            Err(e) => self.mark_failed(job_id, e.to_string()).await,
        };

        match outcome {
            Ok(job) if job.artifact.is_some() => self.deliver(job, book_name).await,
            Ok(_) => {}
            Err(e) => tracing::error!(%job_id, "Failed to record export outcome: {}", e),
        }
    }

    async fn mark_started(&self, job_id: JobId) -> Result<()> {
        let mut job = self.job_or_not_found(job_id).await?;
        job.started_at = Some(Utc::now());
        self.store.save_job(&job).await?;
        Ok(())
    }

    /// Send a packaged job through the configured deliverer, if any
    async fn deliver(&self, job: ExportJob, book_name: String) {
        let Some(target) = &self.delivery else {
            return;
        };
        let Some(artifact) = &job.artifact else {
            return;
        };

        let via = target.deliverer.name().to_string();
        let outcome = match target.storage.read(artifact).await {
            Ok(data) => {
                let delivery = Delivery {
                    job_id: job.id,
                    book_name,
                    range: job.range,
                    data,
                };
                tracing::info!(job_id = %job.id, %via, "Sending export");
                target
                    .deliverer
                    .deliver(&delivery)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(format!("artifact unreadable: {}", e)),
        };

        if let Err(e) = self.record_delivery(job.id, &via, outcome).await {
            tracing::error!(job_id = %job.id, "Failed to record delivery outcome: {}", e);
        }
    }

    /// Record whether a packaged job reached its deliverer
    async fn record_delivery(
        &self,
        job_id: JobId,
        via: &str,
        outcome: std::result::Result<(), String>,
    ) -> Result<ExportJob> {
        let mut job = self.job_or_not_found(job_id).await?;
        match outcome {
            Ok(()) => {
                job.sent = true;
                job.delivery_error = None;
                self.store.save_job(&job).await?;

                tracing::info!(%job_id, %via, "Export delivered");
                self.broadcast(ExportEvent::Delivered {
                    job_id,
                    via: via.to_string(),
                });
            }
            Err(reason) => {
                job.sent = false;
                job.delivery_error = Some(reason.clone());
                self.store.save_job(&job).await?;

                tracing::error!(%job_id, %via, "Export delivery failed: {}", reason);
                self.broadcast(ExportEvent::DeliveryFailed { job_id, reason });
            }
        }
        Ok(job)
    }

    /// Record a packaging failure. Only `Pending` and `Accepted` jobs can fail.
    pub async fn mark_failed(&self, job_id: JobId, reason: impl Into<String>) -> Result<ExportJob> {
        let reason = reason.into();
        let mut job = self.job_or_not_found(job_id).await?;
        if job.status.is_final() {
            return Err(W2kError::Conflict(format!(
                "job {} is already {}",
                job_id,
                job.status.as_str()
            )));
        }

        job.status = JobStatus::Failed {
            reason: reason.clone(),
        };
        job.finished_at = Some(Utc::now());
        self.store.save_job(&job).await?;

        tracing::error!(%job_id, "Export failed: {}", reason);
        self.broadcast(ExportEvent::Failed { job_id, reason });
        Ok(job)
    }

    /// Record a successful packaging. The job stays `Accepted`.
    pub async fn record_artifact(
        &self,
        job_id: JobId,
        artifact: impl Into<String>,
    ) -> Result<ExportJob> {
        let artifact = artifact.into();
        let mut job = self.job_or_not_found(job_id).await?;
        if job.status != JobStatus::Accepted {
            return Err(W2kError::Conflict(format!(
                "job {} is {}, not accepted",
                job_id,
                job.status.as_str()
            )));
        }

        job.artifact = Some(artifact.clone());
        job.finished_at = Some(Utc::now());
        self.store.save_job(&job).await?;

        tracing::info!(%job_id, "Export packaged at {}", artifact);
        self.broadcast(ExportEvent::Packaged { job_id, artifact });
        Ok(job)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Option<ExportJob>> {
        Ok(self.store.get_job(job_id).await?)
    }

    pub async fn list_jobs(&self) -> Result<Vec<ExportJob>> {
        Ok(self.store.list_jobs().await?)
    }

    async fn job_or_not_found(&self, job_id: JobId) -> Result<ExportJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| W2kError::NotFound(format!("job {}", job_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConversionError, DeliveryError};
    use crate::storage::MemoryStorage;
    use crate::store::CatalogStore;
    use crate::types::Cover;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Packager recording the chapter numbers and cover it receives
    #[derive(Default)]
    struct RecordingPackager {
        calls: Mutex<Vec<Vec<u32>>>,
        covers: Mutex<Vec<Option<String>>>,
        fail_with: Option<String>,
        /// Where to write a stand-in artifact, if anywhere
        artifacts: Option<Arc<MemoryStorage>>,
    }

    #[async_trait]
    impl Packager for RecordingPackager {
        async fn package(&self, request: PackageRequest) -> std::result::Result<String, ConversionError> {
            self.calls
                .lock()
                .unwrap()
                .push(request.chapters.iter().map(|c| c.number_in_book()).collect());
            self.covers
                .lock()
                .unwrap()
                .push(request.cover.map(|c| c.mime_type));
            if let Some(reason) = &self.fail_with {
                return Err(ConversionError::EncodingFailed(reason.clone()));
            }

            let path = format!("exports/{}.epub", request.job_id);
            if let Some(storage) = &self.artifacts {
                storage
                    .write(&path, b"PK epub".to_vec())
                    .await
                    .map_err(|e| ConversionError::EncodingFailed(e.to_string()))?;
            }
            Ok(path)
        }
    }

    /// Deliverer recording what it was asked to send
    #[derive(Default)]
    struct RecordingDeliverer {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl Deliverer for RecordingDeliverer {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, delivery: &Delivery) -> std::result::Result<(), DeliveryError> {
            if let Some(reason) = &self.fail_with {
                return Err(DeliveryError::Rejected(reason.clone()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((delivery.book_name.clone(), delivery.data.clone()));
            Ok(())
        }
    }

    async fn delivering_queue(
        deliverer: RecordingDeliverer,
    ) -> (ExportQueue, Arc<RecordingDeliverer>, BookId) {
        let storage = Arc::new(MemoryStorage::new());
        let packager = RecordingPackager {
            artifacts: Some(storage.clone()),
            ..Default::default()
        };
        let (queue, _, book) = setup(&[1, 2], packager).await;
        let deliverer = Arc::new(deliverer);
        (queue.with_deliverer(deliverer.clone(), storage), deliverer, book)
    }

    async fn setup(
        numbers: &[u32],
        packager: RecordingPackager,
    ) -> (ExportQueue, Arc<RecordingPackager>, BookId) {
        let store = Arc::new(CatalogStore::in_memory());
        let book = store.upsert_book("Against the Gods", None, None).await.unwrap();
        for n in numbers {
            store
                .upsert_chapter(book, *n, &format!("Chapter {}", n), "<p>...</p>")
                .await
                .unwrap();
        }
        let packager = Arc::new(packager);
        (ExportQueue::new(store, packager.clone()), packager, book)
    }

    async fn next_event(rx: &mut broadcast::Receiver<ExportEvent>) -> ExportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for export event")
            .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_ranges() {
        let (queue, _, book) = setup(&[1], RecordingPackager::default()).await;
        for (from, to) in [(5, 3), (0, 3), (-1, 2), (-5, -1), (i64::MAX, 1)] {
            assert!(matches!(
                queue.request_export(book, from, to).await,
                Err(W2kError::InvalidRange { .. })
            ));
        }
        assert!(queue.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bounds_past_chapter_numbers_are_accepted() {
        let (queue, packager, book) = setup(&[1, 2], RecordingPackager::default()).await;
        let mut events = queue.subscribe();

        let open_ended = queue.request_export(book, 1, i64::MAX).await.unwrap();
        assert_eq!(open_ended.status, JobStatus::Accepted);
        assert_eq!(open_ended.chapters, vec![1, 2]);
        assert_eq!(open_ended.range.to, i64::MAX as u64);
        next_event(&mut events).await;
        assert!(matches!(next_event(&mut events).await, ExportEvent::Packaged { .. }));

        let beyond = i64::from(u32::MAX) + 1;
        let far = queue.request_export(book, beyond, i64::MAX).await.unwrap();
        assert_eq!(far.status.reason(), Some(NO_CHAPTERS_IN_RANGE));
        assert_eq!(far.range.from, beyond as u64);
        assert_eq!(*packager.calls.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_cover_is_handed_to_packager() {
        let store = Arc::new(CatalogStore::in_memory());
        let book = store.upsert_book("Covered", None, None).await.unwrap();
        store.upsert_chapter(book, 1, "One", "<p>1</p>").await.unwrap();
        store
            .update_cover(book, Cover::new("image/png", vec![0x89, b'P', b'N', b'G']))
            .await
            .unwrap();
        let packager = Arc::new(RecordingPackager::default());
        let queue = ExportQueue::new(store, packager.clone());
        let mut events = queue.subscribe();

        queue.request_export(book, 1, 1).await.unwrap();
        next_event(&mut events).await;
        next_event(&mut events).await;

        assert_eq!(
            *packager.covers.lock().unwrap(),
            vec![Some("image/png".to_string())]
        );
    }

    #[tokio::test]
    async fn test_packaged_job_is_delivered() {
        let (queue, deliverer, book) = delivering_queue(RecordingDeliverer::default()).await;
        let mut events = queue.subscribe();

        let job = queue.request_export(book, 1, 2).await.unwrap();
        assert!(!job.sent);

        assert!(matches!(next_event(&mut events).await, ExportEvent::Accepted { .. }));
        assert!(matches!(next_event(&mut events).await, ExportEvent::Packaged { .. }));
        assert_eq!(
            next_event(&mut events).await,
            ExportEvent::Delivered {
                job_id: job.id,
                via: "recording".to_string(),
            }
        );

        assert_eq!(
            *deliverer.sent.lock().unwrap(),
            vec![("Against the Gods".to_string(), b"PK epub".to_vec())]
        );
        let stored = queue.get_job(job.id).await.unwrap().unwrap();
        assert!(stored.sent);
        assert!(stored.delivery_error.is_none());
        assert!(stored.started_at.is_some());
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_job_accepted() {
        let deliverer = RecordingDeliverer {
            fail_with: Some("mailbox full".to_string()),
            ..Default::default()
        };
        let (queue, _, book) = delivering_queue(deliverer).await;
        let mut events = queue.subscribe();

        let job = queue.request_export(book, 1, 2).await.unwrap();
        next_event(&mut events).await;
        next_event(&mut events).await;
        match next_event(&mut events).await {
            ExportEvent::DeliveryFailed { job_id, reason } => {
                assert_eq!(job_id, job.id);
                assert!(reason.contains("mailbox full"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let stored = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Accepted);
        assert!(stored.artifact.is_some());
        assert!(!stored.sent);
        assert!(stored.delivery_error.unwrap().contains("mailbox full"));
    }

    #[tokio::test]
    async fn test_range_checked_before_book_lookup() {
        let (queue, _, _) = setup(&[], RecordingPackager::default()).await;
        assert!(matches!(
            queue.request_export(BookId(999), 5, 3).await,
            Err(W2kError::InvalidRange { from: 5, to: 3 })
        ));
        assert!(matches!(
            queue.request_export(BookId(999), 1, 3).await,
            Err(W2kError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_gaps_are_exported_in_order() {
        let (queue, packager, book) = setup(&[5, 2, 4, 1], RecordingPackager::default()).await;
        let mut events = queue.subscribe();

        let job = queue.request_export(book, 1, 5).await.unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.chapters, vec![1, 2, 4, 5]);

        assert!(matches!(next_event(&mut events).await, ExportEvent::Accepted { chapters: 4, .. }));
        let packaged = next_event(&mut events).await;
        assert_eq!(
            packaged,
            ExportEvent::Packaged {
                job_id: job.id,
                artifact: format!("exports/{}.epub", job.id),
            }
        );

        assert_eq!(*packager.calls.lock().unwrap(), vec![vec![1, 2, 4, 5]]);
        let stored = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Accepted);
        assert!(stored.artifact.is_some());
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_range_is_rejected_without_dispatch() {
        let (queue, packager, book) = setup(&[1, 2], RecordingPackager::default()).await;

        let job = queue.request_export(book, 10, 20).await.unwrap();
        assert_eq!(job.status.reason(), Some(NO_CHAPTERS_IN_RANGE));
        assert!(job.chapters.is_empty());

        tokio::task::yield_now().await;
        assert!(packager.calls.lock().unwrap().is_empty());
        assert_eq!(queue.get_job(job.id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn test_packaging_failure_marks_job_failed() {
        let packager = RecordingPackager {
            fail_with: Some("zip exploded".to_string()),
            ..Default::default()
        };
        let (queue, _, book) = setup(&[1], packager).await;
        let mut events = queue.subscribe();

        let job = queue.request_export(book, 1, 1).await.unwrap();
        assert_eq!(job.status, JobStatus::Accepted);

        next_event(&mut events).await;
        match next_event(&mut events).await {
            ExportEvent::Failed { job_id, reason } => {
                assert_eq!(job_id, job.id);
                assert!(reason.contains("zip exploded"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let stored = queue.get_job(job.id).await.unwrap().unwrap();
        assert!(matches!(stored.status, JobStatus::Failed { .. }));
        assert!(stored.artifact.is_none());
    }

    #[tokio::test]
    async fn test_final_jobs_cannot_fail_again() {
        let (queue, _, book) = setup(&[1], RecordingPackager::default()).await;
        let rejected = queue.request_export(book, 3, 4).await.unwrap();
        assert!(matches!(
            queue.mark_failed(rejected.id, "late").await,
            Err(W2kError::Conflict(_))
        ));
        assert!(matches!(
            queue.mark_failed(JobId::new(), "unknown").await,
            Err(W2kError::NotFound(_))
        ));
    }
}
