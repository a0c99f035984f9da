//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::config::MAX_VIDEO_MB;

use super::handlers;
use super::ws;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Page deck
        .route(
            "/api/images",
            get(handlers::list_images).delete(handlers::clear_images),
        )
        .route("/api/upload", post(handlers::upload_pages))
        .route("/pages/:filename", get(handlers::serve_page))
        .route("/api/images/:filename", delete(handlers::delete_image))
        .route("/api/images/by-page/:page", delete(handlers::delete_by_page))
        .route("/api/images/replace/:page", post(handlers::replace_page))
        .route("/api/images/insert/:page", post(handlers::insert_page))
        // Pipeline
        .route("/api/process", post(handlers::run_process))
        .route("/api/process/status", get(handlers::process_status))
        // Documents
        .route("/api/documents", get(handlers::list_documents))
        .route("/api/documents/:folder", get(handlers::get_document))
        .route(
            "/api/documents/:folder/conversation",
            post(handlers::append_conversation),
        )
        // Settings
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        // Capture monitor
        .route("/ws/monitor", get(ws::monitor))
        // Body limit must admit the largest allowed video upload
        .layer(DefaultBodyLimit::max(((MAX_VIDEO_MB + 10) * 1024 * 1024) as usize))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
