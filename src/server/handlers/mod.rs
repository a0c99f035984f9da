//! HTTP request handlers for the web server.

mod documents_api;
mod pages_api;
mod process_api;
mod settings_api;

pub use documents_api::{append_conversation, get_document, list_documents};
pub use pages_api::{
    clear_images, delete_by_page, delete_image, insert_page, list_images, replace_page,
    serve_page, upload_pages,
};
pub use process_api::{process_status, run_process};
pub use settings_api::{get_settings, update_settings};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::deck::DeckError;

/// Standard error body: `(status, {"error": message})`.
pub(crate) fn api_error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

/// Map a deck error onto an HTTP response.
pub(crate) fn deck_error(e: DeckError) -> Response {
    let status = match e {
        DeckError::NotFound(_) | DeckError::OutOfRange { .. } => StatusCode::NOT_FOUND,
        DeckError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}
