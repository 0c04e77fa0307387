//! API routes

use crate::config::CorsOrigins;
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

const LOCALHOST_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
];

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::any(),
        CorsOrigins::List(list) => AllowOrigin::list(
            list.iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
        CorsOrigins::Localhost => AllowOrigin::list(
            LOCALHOST_ORIGINS
                .into_iter()
                .map(HeaderValue::from_static),
        ),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Ingestion
        .route("/chapter", post(handlers::add_chapter))
        .route("/chapter/:id", get(handlers::get_chapter))
        // Books
        .route("/books", get(handlers::list_books))
        .route("/book/:id", get(handlers::get_book).patch(handlers::update_book))
        .route("/book/:id/chapters", get(handlers::list_book_chapters))
        .route(
            "/book/:id/cover",
            get(handlers::get_cover).put(handlers::upload_cover),
        )
        // Exports
        .route("/export", post(handlers::request_export))
        .route("/exports", get(handlers::list_exports))
        .route("/export/:id", get(handlers::get_export))
        .route("/export/:id/download", get(handlers::download_export))
        // SSE endpoint
        .route("/sync", get(handlers::sync_events));

    let config = state.config.clone();

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins))
                .layer(TimeoutLayer::new(config.request_timeout))
                .layer(DefaultBodyLimit::max(config.body_limit)),
        )
        .with_state(state)
}
