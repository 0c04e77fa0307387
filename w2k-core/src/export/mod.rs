//! Export queue: range validation, dispatch to a packager, delivery and outcome tracking

mod delivery;
mod engine;
mod epub;

pub use delivery::{
    Deliverer, Delivery, SmtpDeliverer, SmtpSettings, WebhookDeliverer, ATTACHMENT_NAME,
    EPUB_MIME,
};
pub use engine::{ExportEvent, ExportQueue, NO_CHAPTERS_IN_RANGE};
pub use epub::EpubPackager;

use crate::error::ConversionError;
use crate::types::{Book, Chapter, Cover, JobId};
use async_trait::async_trait;

/// Everything a packager needs to build one artifact
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub job_id: JobId,
    pub book: Book,

    /// Cover image loaded from the store, if the book has one
    pub cover: Option<Cover>,

    /// Chapters in ascending `number_in_book` order
    pub chapters: Vec<Chapter>,
}

/// Collaborator turning a chapter list into a deliverable artifact
#[async_trait]
pub trait Packager: Send + Sync {
    /// Build the artifact and return the storage key it was written to
    async fn package(&self, request: PackageRequest) -> Result<String, ConversionError>;
}
