//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use w2k_core::{StorageError, W2kError};

/// Errors returned by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] W2kError),

    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Core(err.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(W2kError::InvalidPayload(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(W2kError::InvalidRange { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Core(W2kError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(W2kError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Core(W2kError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Core(W2kError::Packaging(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Application error: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
