//! Chapter ingestion and retrieval

use crate::auth::Authorized;
use crate::error::ApiError;
use crate::state::{AppState, ServerEvent};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use w2k_core::{BookId, Chapter, ChapterId, ChapterPayload, W2kError};

/// Ids assigned to an ingested chapter
#[derive(Debug, Serialize)]
pub struct AddChapterResponse {
    pub book_id: BookId,
    pub chapter_id: ChapterId,
}

/// Ingest one scraped chapter
pub async fn add_chapter(
    _auth: Authorized,
    State(state): State<AppState>,
    Json(payload): Json<ChapterPayload>,
) -> Result<(StatusCode, Json<AddChapterResponse>), ApiError> {
    let ingested = state.ingest.ingest(&payload).await?;

    state.broadcast(ServerEvent::ChapterIngested {
        book_id: ingested.book_id,
        chapter_id: ingested.chapter_id,
        number_in_book: ingested.number_in_book,
    });

    Ok((
        StatusCode::CREATED,
        Json(AddChapterResponse {
            book_id: ingested.book_id,
            chapter_id: ingested.chapter_id,
        }),
    ))
}

/// Get a chapter with its content
pub async fn get_chapter(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Chapter>, ApiError> {
    let chapter = state
        .store
        .get_chapter(ChapterId(id))
        .await?
        .ok_or_else(|| W2kError::NotFound(format!("chapter {}", id)))?;
    Ok(Json(chapter))
}
