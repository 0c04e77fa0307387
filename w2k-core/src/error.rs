//! Error types for wuxia2kindle core

use thiserror::Error;

/// Result type alias using W2kError
pub type Result<T> = std::result::Result<T, W2kError>;

/// Top-level error type for ingestion and export operations
#[derive(Debug, Error)]
pub enum W2kError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid range: {from}..={to}")]
    InvalidRange { from: i64, to: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Packaging error: {0}")]
    Packaging(#[from] ConversionError),
}

impl From<StorageError> for W2kError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => W2kError::NotFound(what),
            other => W2kError::Storage(other),
        }
    }
}

/// Errors raised by the packaging collaborator
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid cover: {0}")]
    InvalidCover(String),
}

/// Errors raised while sending a packaged book to the reader
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery misconfigured: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Delivery refused: {0}")]
    Rejected(String),
}

/// Errors that occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Corrupt catalog: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err: W2kError = StorageError::NotFound("book 7".to_string()).into();
        assert!(matches!(err, W2kError::NotFound(ref s) if s == "book 7"));
    }

    #[test]
    fn test_backend_error_stays_storage() {
        let err: W2kError = StorageError::BackendError("disk full".to_string()).into();
        assert!(matches!(err, W2kError::Storage(StorageError::BackendError(_))));
        assert_eq!(err.to_string(), "Storage error: Backend error: disk full");
    }
}
