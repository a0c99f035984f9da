//! Generated-document API: listing, retrieval, conversation history.

use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::models::{ConversationTurn, Document};

use super::super::AppState;
use super::api_error;

/// List generated document folders.
pub async fn list_documents(State(state): State<AppState>) -> Response {
    let entries = match std::fs::read_dir(&state.settings.output_dir) {
        Ok(entries) => entries,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let mut documents: Vec<serde_json::Value> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let folder = entry.file_name().into_string().ok()?;
            Some(serde_json::json!({ "folder": folder }))
        })
        .collect();
    documents.sort_by(|a, b| a["folder"].as_str().cmp(&b["folder"].as_str()));

    Json(serde_json::json!({ "documents": documents })).into_response()
}

/// Fetch one document's markdown and conversation history.
pub async fn get_document(
    State(state): State<AppState>,
    Path(folder): Path<String>,
) -> Response {
    let path = match resolve_folder(&state, &folder) {
        Ok(path) => path,
        Err(response) => return response,
    };

    match Document::load(&path) {
        Ok(document) => Json(serde_json::json!({
            "title": document.title,
            "content": document.content,
            "conversation": document.conversation,
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    pub user: String,
    pub assistant: String,
}

/// Append a user/assistant turn pair to a document's history.
pub async fn append_conversation(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Json(request): Json<ConversationRequest>,
) -> Response {
    let path = match resolve_folder(&state, &folder) {
        Ok(path) => path,
        Err(response) => return response,
    };

    let mut document = match Document::load(&path) {
        Ok(document) => document,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let result = document.append_turns(
        &path,
        ConversationTurn::user(request.user),
        ConversationTurn::assistant(request.assistant),
    );
    match result {
        Ok(()) => Json(serde_json::json!({
            "turns": document.conversation.len(),
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Resolve a folder name inside the output directory, rejecting path
/// traversal.
fn resolve_folder(state: &AppState, folder: &str) -> Result<PathBuf, Response> {
    if folder.contains('/') || folder.contains('\\') || folder.contains("..") {
        return Err(api_error(StatusCode::BAD_REQUEST, "invalid folder name"));
    }
    let path = state.settings.output_dir.join(folder);
    if !path.is_dir() {
        return Err(api_error(StatusCode::NOT_FOUND, "document not found"));
    }
    Ok(path)
}
