//! Server-Sent Events handler for real-time updates

use crate::state::{AppState, ServerEvent};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use w2k_core::ExportEvent;

fn server_event(event: ServerEvent) -> (&'static str, String) {
    match event {
        ServerEvent::ChapterIngested {
            book_id,
            chapter_id,
            number_in_book,
        } => (
            "chapter_ingested",
            serde_json::json!({
                "book_id": book_id,
                "chapter_id": chapter_id,
                "number_in_book": number_in_book,
            })
            .to_string(),
        ),
        ServerEvent::CoverUpdated { book_id } => (
            "cover_updated",
            serde_json::json!({ "book_id": book_id }).to_string(),
        ),
    }
}

fn export_event(event: ExportEvent) -> (&'static str, String) {
    match event {
        ExportEvent::Accepted {
            job_id,
            book_id,
            chapters,
        } => (
            "export_accepted",
            serde_json::json!({ "job_id": job_id, "book_id": book_id, "chapters": chapters })
                .to_string(),
        ),
        ExportEvent::Rejected { job_id, reason } => (
            "export_rejected",
            serde_json::json!({ "job_id": job_id, "reason": reason }).to_string(),
        ),
        ExportEvent::Packaged { job_id, .. } => (
            "export_packaged",
            serde_json::json!({
                "job_id": job_id,
                "download_url": format!("/api/v1/export/{}/download", job_id),
            })
            .to_string(),
        ),
        ExportEvent::Failed { job_id, reason } => (
            "export_failed",
            serde_json::json!({ "job_id": job_id, "reason": reason }).to_string(),
        ),
        ExportEvent::Delivered { job_id, via } => (
            "export_delivered",
            serde_json::json!({ "job_id": job_id, "via": via }).to_string(),
        ),
        ExportEvent::DeliveryFailed { job_id, reason } => (
            "export_delivery_failed",
            serde_json::json!({ "job_id": job_id, "reason": reason }).to_string(),
        ),
    }
}

/// SSE endpoint for real-time updates
pub async fn sync_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Lagged receivers skip the missed events
    let server = BroadcastStream::new(state.subscribe())
        .filter_map(|result| result.ok().map(server_event));
    let exports = BroadcastStream::new(state.exports.subscribe())
        .filter_map(|result| result.ok().map(export_event));

    let event_stream = server
        .merge(exports)
        .map(|(event_type, data)| Ok(Event::default().event(event_type).data(data)));

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
