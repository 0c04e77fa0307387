//! Cover images attached to books

use crate::error::ConversionError;
use super::BookId;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A cover image as opaque bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    /// MIME type (e.g., "image/png")
    pub mime_type: String,

    /// Raw image bytes
    pub data: Vec<u8>,
}

/// Catalog entry pointing at a stored cover blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoverRef {
    pub mime_type: String,

    /// Storage key of the image bytes
    pub key: String,
}

impl Cover {
    /// Create a cover from raw bytes
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Create a cover from raw bytes, sniffing the MIME type from magic numbers
    pub fn sniffed(data: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&data).to_string();
        Self { mime_type, data }
    }

    /// Parse a cover as sent by the browser client.
    ///
    /// Accepts either a data URL (`data:image/png;base64,...`) or a bare
    /// base64 string, in which case the MIME type is sniffed.
    pub fn from_transport(value: &str) -> Result<Self, ConversionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConversionError::InvalidCover("empty cover".to_string()));
        }

        if let Some(rest) = value.strip_prefix("data:") {
            let (mime, payload) = rest.split_once(";base64,").ok_or_else(|| {
                ConversionError::InvalidCover("data URL is not base64 encoded".to_string())
            })?;
            let data = STANDARD
                .decode(payload)
                .map_err(|e| ConversionError::InvalidCover(e.to_string()))?;
            if data.is_empty() {
                return Err(ConversionError::InvalidCover("empty cover".to_string()));
            }
            let mime = if mime.is_empty() { sniff_mime(&data) } else { mime };
            return Ok(Self::new(mime, data));
        }

        let data = STANDARD
            .decode(value)
            .map_err(|e| ConversionError::InvalidCover(e.to_string()))?;
        Ok(Self::sniffed(data))
    }

    /// File extension matching the MIME type
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }

    /// SHA-256 of the image bytes, hex encoded
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }

    /// Content-addressed storage key for this image as the cover of `book_id`.
    /// A new image never overwrites the blob an existing catalog points at.
    pub fn storage_key(&self, book_id: BookId) -> String {
        format!("covers/{}-{}.{}", book_id, self.digest(), self.extension())
    }
}

/// Guess an image MIME type from its leading bytes
pub fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}
