//! Export job handlers

use super::books::find_book;
use crate::auth::Authorized;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use w2k_core::{BookId, ExportJob, JobId, JobStatus, W2kError};

/// Export request body
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub book_id: BookId,
    pub from: i64,
    pub to: i64,
}

/// Flattened view of an export job
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: JobId,
    pub book_id: BookId,
    pub from: u64,
    pub to: u64,
    pub chapters: Vec<u32>,
    pub status: &'static str,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
    pub sent: bool,
    pub delivery_error: Option<String>,
}

impl From<ExportJob> for JobResponse {
    fn from(job: ExportJob) -> Self {
        let download_url = job
            .artifact
            .as_ref()
            .map(|_| format!("/api/v1/export/{}/download", job.id));
        Self {
            job_id: job.id,
            book_id: job.book_id,
            from: job.range.from,
            to: job.range.to,
            status: job.status.as_str(),
            reason: job.status.reason().map(str::to_string),
            chapters: job.chapters,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            download_url,
            sent: job.sent,
            delivery_error: job.delivery_error,
        }
    }
}

/// Request an export of a chapter range
pub async fn request_export(
    _auth: Authorized,
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let job = state
        .exports
        .request_export(request.book_id, request.from, request.to)
        .await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

/// Get one export job
pub async fn get_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = find_job(&state, JobId(id)).await?;
    Ok(Json(job.into()))
}

/// All export jobs, oldest first
pub async fn list_exports(State(state): State<AppState>) -> Result<Json<Vec<JobResponse>>, ApiError> {
    let jobs = state.exports.list_jobs().await?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

/// Sanitize a filename for Content-Disposition header
fn sanitize_filename(name: &str, max_len: usize) -> String {
    name.chars()
        .take(max_len)
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_' || *c == '.')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Download the packaged artifact of a job
pub async fn download_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let job = find_job(&state, JobId(id)).await?;
    let artifact = match (&job.status, &job.artifact) {
        (JobStatus::Accepted, Some(artifact)) => artifact.clone(),
        (JobStatus::Accepted, None) | (JobStatus::Pending, _) => {
            return Err(W2kError::Conflict(format!("job {} is still packaging", job.id)).into())
        }
        (status, _) => {
            return Err(W2kError::Conflict(format!("job {} has no artifact: {}", job.id, status)).into())
        }
    };

    let book = find_book(&state, job.book_id).await?;
    let data = state.storage.read(&artifact).await?;
    let filename = format!(
        "{} {}-{}.epub",
        sanitize_filename(&book.name, 50),
        job.range.from,
        job.range.to
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/epub+zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    )
        .into_response())
}

async fn find_job(state: &AppState, id: JobId) -> Result<ExportJob, ApiError> {
    state
        .exports
        .get_job(id)
        .await?
        .ok_or_else(|| W2kError::NotFound(format!("export job {}", id)).into())
}
