//! Page deck API: listing, upload, retrieval, reordering, deletion.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::{MAX_IMAGE_MB, MAX_VIDEO_MB};
use crate::models::PageKind;

use super::super::AppState;
use super::{api_error, deck_error};

/// List pages newest-first.
pub async fn list_images(State(state): State<AppState>) -> impl IntoResponse {
    let deck = state.deck.lock().await;
    let images: Vec<serde_json::Value> = deck
        .list()
        .iter()
        .map(|page| {
            serde_json::json!({
                "filename": page.content_ref,
                "type": page.kind.as_str(),
                "created_at": page.created_at.to_rfc3339(),
            })
        })
        .collect();
    Json(serde_json::json!({ "images": images }))
}

/// Per-file upload outcome.
#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<String>,
    pub status: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    fn rejected(filename: String, error: impl Into<String>) -> Self {
        Self {
            filename,
            saved_as: None,
            status: "error".to_string(),
            kind: None,
            error: Some(error.into()),
        }
    }
}

/// Upload one or more page files. Each file succeeds or fails on its own;
/// a rejected file never stops its siblings.
pub async fn upload_pages(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let mut results: Vec<UploadResult> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return api_error(StatusCode::BAD_REQUEST, e),
        };

        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                results.push(UploadResult::rejected(filename, e.to_string()));
                continue;
            }
        };

        results.push(store_upload(&state, filename, &bytes).await);
    }

    Json(serde_json::json!({ "results": results })).into_response()
}

/// Validate one uploaded file and append it to the deck.
async fn store_upload(state: &AppState, filename: String, bytes: &[u8]) -> UploadResult {
    let extension = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => {
            return UploadResult::rejected(filename, "file has no extension");
        }
    };
    let Some(kind) = PageKind::from_extension(&extension) else {
        return UploadResult::rejected(
            filename,
            format!("unsupported file type: .{}", extension),
        );
    };

    let limit_mb = match kind {
        PageKind::Image => MAX_IMAGE_MB,
        PageKind::Video => MAX_VIDEO_MB,
    };
    if bytes.len() as u64 > limit_mb * 1024 * 1024 {
        return UploadResult::rejected(
            filename,
            format!("file exceeds the {} MB limit", limit_mb),
        );
    }
    if bytes.is_empty() {
        return UploadResult::rejected(filename, "file is empty");
    }

    let basename = filename.rsplit_once('.').map(|(stem, _)| stem);
    let mut deck = state.deck.lock().await;
    match deck.append(bytes, &extension, basename) {
        Ok(page) => UploadResult {
            filename,
            saved_as: Some(page.content_ref.clone()),
            status: "success".to_string(),
            kind: Some(page.kind.as_str().to_string()),
            error: None,
        },
        Err(e) => UploadResult::rejected(filename, e.to_string()),
    }
}

/// Serve a page's raw bytes with a guessed content type.
pub async fn serve_page(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let path = {
        let deck = state.deck.lock().await;
        match deck.find_by_name(&filename) {
            Some(page) => deck.content_path(page),
            None => return api_error(StatusCode::NOT_FOUND, "page not found"),
        }
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&filename).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(_) => api_error(StatusCode::NOT_FOUND, "page content missing"),
    }
}

/// Delete one page by filename.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let mut deck = state.deck.lock().await;
    match deck.delete_by_name(&filename) {
        Ok(page) => Json(serde_json::json!({ "deleted": page.content_ref })).into_response(),
        Err(e) => deck_error(e),
    }
}

/// Delete every page.
pub async fn clear_images(State(state): State<AppState>) -> Response {
    let mut deck = state.deck.lock().await;
    match deck.clear() {
        Ok(removed) => Json(serde_json::json!({ "removed": removed })).into_response(),
        Err(e) => deck_error(e),
    }
}

/// Delete one page by its 1-based page number.
pub async fn delete_by_page(
    State(state): State<AppState>,
    Path(page): Path<usize>,
) -> Response {
    let mut deck = state.deck.lock().await;
    match deck.delete(page) {
        Ok(page) => Json(serde_json::json!({ "deleted": page.content_ref })).into_response(),
        Err(e) => deck_error(e),
    }
}

/// Replace a page's stored bytes; its position is unchanged.
pub async fn replace_page(
    State(state): State<AppState>,
    Path(page): Path<usize>,
    multipart: Multipart,
) -> Response {
    let (_, bytes) = match read_single_file(multipart).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    let mut deck = state.deck.lock().await;
    let limit_mb = match deck.get(page) {
        Ok(existing) => match existing.kind {
            PageKind::Image => MAX_IMAGE_MB,
            PageKind::Video => MAX_VIDEO_MB,
        },
        Err(e) => return deck_error(e),
    };
    if bytes.len() as u64 > limit_mb * 1024 * 1024 {
        return api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("file exceeds the {} MB limit", limit_mb),
        );
    }

    match deck.replace(page, &bytes) {
        Ok(page) => Json(serde_json::json!({ "replaced": page.content_ref })).into_response(),
        Err(e) => deck_error(e),
    }
}

/// Insert an uploaded file after position `page` (0 = front).
pub async fn insert_page(
    State(state): State<AppState>,
    Path(page): Path<usize>,
    multipart: Multipart,
) -> Response {
    let (filename, bytes) = match read_single_file(multipart).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    let Some((stem, extension)) = filename.rsplit_once('.') else {
        return api_error(StatusCode::BAD_REQUEST, "file has no extension");
    };
    let extension = extension.to_ascii_lowercase();
    if PageKind::from_extension(&extension) != Some(PageKind::Image) {
        return api_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported file type: .{}", extension),
        );
    }
    if bytes.len() as u64 > MAX_IMAGE_MB * 1024 * 1024 {
        return api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("file exceeds the {} MB limit", MAX_IMAGE_MB),
        );
    }

    let mut deck = state.deck.lock().await;
    match deck.insert_after(page, &bytes, &extension, Some(stem)) {
        Ok(page) => Json(serde_json::json!({ "inserted": page.content_ref })).into_response(),
        Err(e) => deck_error(e),
    }
}

/// Pull the first file field out of a multipart body.
async fn read_single_file(mut multipart: Multipart) -> Result<(String, Vec<u8>), Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                return Err(api_error(StatusCode::BAD_REQUEST, "no file in request"));
            }
            Err(e) => return Err(api_error(StatusCode::BAD_REQUEST, e)),
        };
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
        if bytes.is_empty() {
            return Err(api_error(StatusCode::BAD_REQUEST, "file is empty"));
        }
        return Ok((filename, bytes.to_vec()));
    }
}
