//! wuxia2kindle Core Library
//!
//! This crate holds the ingestion and export-queue subsystem: scraped chapters
//! are committed into a [`store::Store`] under their book, and contiguous
//! chapter ranges are exported through an [`export::ExportQueue`] that hands
//! them to a [`export::Packager`] (EPUB by default). Packaged books can then be
//! sent on by an [`export::Deliverer`] (webhook or SMTP).

pub mod error;
pub mod export;
pub mod ingest;
pub mod storage;
pub mod store;
pub mod types;

pub use error::{ConversionError, DeliveryError, Result, StorageError, W2kError};
pub use export::{
    Deliverer, Delivery, EpubPackager, ExportEvent, ExportQueue, PackageRequest, Packager,
    SmtpDeliverer, SmtpSettings, WebhookDeliverer,
};
pub use ingest::{ChapterPayload, IngestService, Ingested};
pub use store::{CatalogStore, Store};
pub use types::{
    Book, BookId, Chapter, ChapterId, ChapterRange, ChapterSummary, Cover, CoverRef, ExportJob, JobId,
    JobStatus,
};
