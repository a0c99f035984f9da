//! Pipeline processing endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::pipeline::extract::BatchExtractor;
use crate::pipeline::summary::SummaryGenerator;
use crate::pipeline::PipelineError;
use crate::providers::{build_chain, ProviderError};
use crate::settings_store::SettingsStore;

use super::super::AppState;
use super::api_error;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub mode: String,
}

/// Run one pipeline stage. Only one job may run at a time.
pub async fn run_process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Response {
    if request.mode != "extract" && request.mode != "summary" {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("unknown mode '{}' (expected extract or summary)", request.mode),
        );
    }

    {
        let mut job = state.process_job.write().await;
        if job.running {
            return api_error(StatusCode::CONFLICT, "a process job is already running");
        }
        job.running = true;
        job.mode = Some(request.mode.clone());
        job.error = None;
        job.completed = false;
    }

    // The job runs in its own task so it finishes (and releases the
    // running flag) even if the client disconnects and this handler
    // future is dropped mid-run. The status is updated from inside the
    // task; the handler merely awaits the outcome for its response.
    let mode = request.mode.clone();
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        let result = match mode.as_str() {
            "extract" => run_extract(&task_state).await,
            _ => run_summary(&task_state).await,
        };
        let mut job = task_state.process_job.write().await;
        job.running = false;
        match &result {
            Ok(_) => job.completed = true,
            Err(e) => job.error = Some(e.to_string()),
        }
        result
    });

    match handle.await {
        Ok(Ok(body)) => Json(body).into_response(),
        Ok(Err(e)) => pipeline_error(e),
        Err(e) => {
            let mut job = state.process_job.write().await;
            job.running = false;
            job.error = Some(e.to_string());
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "process job panicked")
        }
    }
}

/// Report the current (or last) job's status.
pub async fn process_status(State(state): State<AppState>) -> impl IntoResponse {
    let job = state.process_job.read().await;
    Json(job.clone())
}

async fn run_extract(state: &AppState) -> Result<serde_json::Value, PipelineError> {
    let store = SettingsStore::new(state.settings.env_file_path());
    let providers = build_chain(&state.settings.providers.extract, &state.settings, &store)?;

    let extractor = BatchExtractor::new(state.settings.clone());
    // Hold the deck only while pages are copied into staging; capture
    // sessions and the deck API keep working during the provider calls.
    let staged = {
        let deck = state.deck.lock().await;
        extractor.stage(&deck)?
    };
    let report = extractor.run(staged, &providers).await?;

    Ok(serde_json::json!({
        "mode": "extract",
        "pages_total": report.pages_total,
        "pages_extracted": report.pages_extracted,
        "batches_failed": report.batches_failed,
    }))
}

async fn run_summary(state: &AppState) -> Result<serde_json::Value, PipelineError> {
    let store = SettingsStore::new(state.settings.env_file_path());
    let providers = build_chain(&state.settings.providers.summary, &state.settings, &store)?;

    let report = SummaryGenerator::new(state.settings.clone())
        .run(&providers)
        .await?;

    Ok(serde_json::json!({
        "mode": "summary",
        "title": report.title,
        "path": report.path.display().to_string(),
    }))
}

/// Map a pipeline error onto an HTTP response.
fn pipeline_error(e: PipelineError) -> Response {
    let status = match &e {
        PipelineError::NothingToProcess | PipelineError::ExtractRequired => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::Provider(ProviderError::Configuration(_)) => StatusCode::BAD_REQUEST,
        PipelineError::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}
