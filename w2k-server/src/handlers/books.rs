//! Book catalog handlers

use crate::auth::Authorized;
use crate::error::ApiError;
use crate::state::{AppState, ServerEvent};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use w2k_core::{Book, BookId, ChapterSummary, Cover, W2kError};

/// Query parameters for listing books
#[derive(Debug, Deserialize)]
pub struct ListBooksQuery {
    /// Page number (1-indexed, 0 treated as 1)
    #[serde(default = "default_page")]
    pub page: u32,

    /// Items per page
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Case-insensitive match on name, author or translator
    pub search: Option<String>,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    20
}

/// Book summary for list and detail responses
#[derive(Debug, Serialize)]
pub struct BookSummary {
    pub id: BookId,
    pub name: String,
    pub author: Option<String>,
    pub translator: Option<String>,
    pub chapter_count: u32,
    pub has_cover: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            name: book.name.clone(),
            author: book.author.clone(),
            translator: book.translator.clone(),
            chapter_count: book.chapter_count,
            has_cover: book.has_cover(),
            created_at: book.created_at,
        }
    }
}

/// List response with pagination
#[derive(Debug, Serialize)]
pub struct ListBooksResponse {
    pub books: Vec<BookSummary>,
    pub total: u32,
    pub page: u32,
    pub per_page: u32,
}

fn matches_search(book: &Book, search: &str) -> bool {
    let needle = search.to_lowercase();
    [Some(&book.name), book.author.as_ref(), book.translator.as_ref()]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// List all books, sorted by name
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<ListBooksQuery>,
) -> Result<Json<ListBooksResponse>, ApiError> {
    let mut books: Vec<BookSummary> = state
        .store
        .list_books()
        .await?
        .iter()
        .filter(|book| match query.search.as_deref() {
            Some(search) => matches_search(book, search),
            None => true,
        })
        .map(BookSummary::from)
        .collect();

    books.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let total = books.len() as u32;
    let page = query.page.max(1);
    let start = (page - 1) as usize * query.per_page as usize;
    let books = books
        .into_iter()
        .skip(start)
        .take(query.per_page as usize)
        .collect();

    Ok(Json(ListBooksResponse {
        books,
        total,
        page,
        per_page: query.per_page,
    }))
}

/// Get a single book
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<BookSummary>, ApiError> {
    let book = find_book(&state, BookId(id)).await?;
    Ok(Json(BookSummary::from(&book)))
}

/// Chapters of a book, ascending by number
pub async fn list_book_chapters(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<ChapterSummary>>, ApiError> {
    Ok(Json(state.store.list_chapters(BookId(id)).await?))
}

/// Partial book update
#[derive(Debug, Deserialize)]
pub struct UpdateBookRequest {
    /// Data URL (`data:image/png;base64,...`) or bare base64
    pub cover: String,
}

/// Replace a book's cover from an encoded image
pub async fn update_book(
    _auth: Authorized,
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateBookRequest>,
) -> Result<StatusCode, ApiError> {
    let cover =
        Cover::from_transport(&request.cover).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    store_cover(&state, BookId(id), cover).await
}

/// Replace a book's cover from a multipart `file` upload
pub async fn upload_cover(
    _auth: Authorized,
    State(state): State<AppState>,
    Path(id): Path<u64>,
    mut multipart: axum_extra::extract::Multipart,
) -> Result<StatusCode, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let declared = field
            .content_type()
            .filter(|mime| mime.starts_with("image/"))
            .map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
            .to_vec();
        if data.is_empty() {
            return Err(ApiError::BadRequest("Cover file is empty".to_string()));
        }

        let cover = match declared {
            Some(mime) => Cover::new(mime, data),
            None => Cover::sniffed(data),
        };
        return store_cover(&state, BookId(id), cover).await;
    }

    Err(ApiError::BadRequest("No file provided".to_string()))
}

async fn store_cover(state: &AppState, book_id: BookId, cover: Cover) -> Result<StatusCode, ApiError> {
    let mime = cover.mime_type.clone();
    state.store.update_cover(book_id, cover).await?;

    tracing::info!(%book_id, %mime, "Cover updated");
    state.broadcast(ServerEvent::CoverUpdated { book_id });
    Ok(StatusCode::ACCEPTED)
}

/// Raw cover image
pub async fn get_cover(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let cover = state
        .store
        .get_cover(BookId(id))
        .await?
        .ok_or_else(|| W2kError::NotFound(format!("cover of book {}", id)))?;

    Ok(([(header::CONTENT_TYPE, cover.mime_type)], cover.data).into_response())
}

pub(crate) async fn find_book(state: &AppState, id: BookId) -> Result<Book, ApiError> {
    state
        .store
        .get_book(id)
        .await?
        .ok_or_else(|| W2kError::NotFound(format!("book {}", id)).into())
}
