//! Settings store endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::settings_store::{SettingsStore, StoreError};

use super::super::AppState;
use super::api_error;

/// Read the settings store as a key-value map.
pub async fn get_settings(State(state): State<AppState>) -> Response {
    let store = SettingsStore::new(state.settings.env_file_path());
    match store.read_all() {
        Ok(settings) => Json(serde_json::json!({ "settings": settings })).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Update settings. Keys are validated; a malformed Zhipu key is rejected.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(updates): Json<BTreeMap<String, String>>,
) -> Response {
    let store = SettingsStore::new(state.settings.env_file_path());
    match store.set_many(&updates) {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e @ (StoreError::InvalidKey(_) | StoreError::MalformedZhipuKey)) => {
            api_error(StatusCode::BAD_REQUEST, e)
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
