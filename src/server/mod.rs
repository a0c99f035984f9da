//! Web server for page capture and document management.
//!
//! Serves the page deck API (upload, reorder, delete), the processing
//! endpoints, document browsing, the settings store, and the WebSocket
//! capture monitor.

mod handlers;
mod routes;
mod ws;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::Settings;
use crate::deck::PageDeck;
use crate::detect::{self, PresenceOracle};

/// Status of the current (or last) pipeline job.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProcessJobStatus {
    /// Stage being run ("extract" or "summary"), if any was started.
    pub mode: Option<String>,
    /// Whether a job is running right now.
    pub running: bool,
    /// Error message if the last job failed.
    pub error: Option<String>,
    /// Whether the last job finished successfully.
    pub completed: bool,
}

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub deck: Arc<Mutex<PageDeck>>,
    pub oracle: Arc<dyn PresenceOracle>,
    /// Pipeline job status (only one job runs at a time).
    pub process_job: Arc<RwLock<ProcessJobStatus>>,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        settings.ensure_directories()?;
        let deck = PageDeck::open(&settings.pages_dir, &settings.deck_meta_path())?;

        Ok(Self {
            settings: settings.clone(),
            deck: Arc::new(Mutex::new(deck)),
            oracle: detect::from_settings(settings),
            process_job: Arc::new(RwLock::new(ProcessJobStatus::default())),
        })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::models::Document;

    fn setup_test_app(dir: &std::path::Path) -> (axum::Router, Settings) {
        let settings = Settings::with_data_dir(dir.to_path_buf());
        let state = AppState::new(&settings).unwrap();
        (create_router(state), settings)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const BOUNDARY: &str = "test-boundary";

    /// Build a multipart body from (field, filename, bytes) parts.
    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, bytes) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                    field, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(uri: &str, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_images_empty() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let response = app
            .oneshot(Request::get("/api/images").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["images"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_upload_batch_with_one_unsupported() {
        let dir = tempdir().unwrap();
        let (app, settings) = setup_test_app(dir.path());

        let request = multipart_request(
            "/api/upload",
            &[
                ("files", "scan1.jpg", b"jpeg bytes".as_slice()),
                ("files", "scan2.png", b"png bytes".as_slice()),
                ("files", "notes.pdf", b"pdf bytes".as_slice()),
            ],
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        let successes = results
            .iter()
            .filter(|r| r["status"] == "success")
            .count();
        assert_eq!(successes, 2);
        assert_eq!(results[2]["status"], "error");

        // the rejected file was not stored
        let stored = std::fs::read_dir(&settings.pages_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .count();
        assert_eq!(stored, 2);

        let response = app
            .oneshot(Request::get("/api/images").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["images"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_image_is_404() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let response = app
            .oneshot(
                Request::delete("/api/images/nope.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert!(json["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_page_out_of_range_is_404() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let response = app
            .oneshot(
                Request::delete("/api/images/by-page/5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_replace_roundtrips_through_pages_route() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let upload = multipart_request(
            "/api/upload",
            &[("files", "page.png", b"original bytes".as_slice())],
        );
        let response = app.clone().oneshot(upload).await.unwrap();
        let json = body_json(response).await;
        let saved_as = json["results"][0]["saved_as"].as_str().unwrap().to_string();

        let replace = multipart_request(
            "/api/images/replace/1",
            &[("file", "new.png", b"replacement bytes".as_slice())],
        );
        let response = app.clone().oneshot(replace).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get(format!("/pages/{}", saved_as))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"replacement bytes");
    }

    #[tokio::test]
    async fn test_insert_at_front_becomes_page_one() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let upload = multipart_request(
            "/api/upload",
            &[("files", "first.png", b"first".as_slice())],
        );
        app.clone().oneshot(upload).await.unwrap();

        let insert = multipart_request(
            "/api/images/insert/0",
            &[("file", "cover.png", b"cover".as_slice())],
        );
        let response = app.clone().oneshot(insert).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/images").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        let images = json["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0]["filename"]
            .as_str()
            .unwrap()
            .contains("cover"));
    }

    #[tokio::test]
    async fn test_clear_images_reports_count() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let upload = multipart_request(
            "/api/upload",
            &[
                ("files", "a.png", b"a".as_slice()),
                ("files", "b.png", b"b".as_slice()),
            ],
        );
        app.clone().oneshot(upload).await.unwrap();

        let response = app
            .oneshot(Request::delete("/api/images").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["removed"], 2);
    }

    #[tokio::test]
    async fn test_process_summary_without_extract_fails() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let response = app
            .oneshot(
                Request::post("/api/process")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"mode": "summary"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("extract"));
    }

    #[tokio::test]
    async fn test_process_rejects_unknown_mode() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let response = app
            .oneshot(
                Request::post("/api/process")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"mode": "transmogrify"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Bind a throwaway endpoint that accepts one connection, holds it
    /// open for `stall`, then drops it without answering.
    async fn stalling_endpoint(stall: std::time::Duration) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                tokio::time::sleep(stall).await;
                drop(socket);
            }
        });
        addr
    }

    fn process_extract_request() -> Request<Body> {
        Request::post("/api/process")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"mode": "extract"}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn test_disconnected_process_request_releases_job_flag() {
        use std::time::Duration;

        let dir = tempdir().unwrap();
        let (app, settings) = setup_test_app(dir.path());

        let upload =
            multipart_request("/api/upload", &[("files", "page.png", b"bytes".as_slice())]);
        app.clone().oneshot(upload).await.unwrap();

        let addr = stalling_endpoint(Duration::from_millis(300)).await;
        std::fs::write(
            settings.env_file_path(),
            format!("LMSTUDIO_API_ENDPOINT=http://{}/v1\n", addr),
        )
        .unwrap();

        // The client gives up mid-run; dropping the handler future must
        // not leave the job marked as running
        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), app.clone().oneshot(process_extract_request()));
        assert!(abandoned.await.is_err());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/api/process/status")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let json = body_json(response).await;
            if json["running"] == false {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "job never released the running flag"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // A new run can start; anything but CONFLICT proves the flag
        // was released (this one fails fast on the dead endpoint)
        let response = app.oneshot(process_extract_request()).await.unwrap();
        assert_ne!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_deck_api_stays_responsive_during_extract() {
        use std::time::Duration;

        let dir = tempdir().unwrap();
        let (app, settings) = setup_test_app(dir.path());

        let upload =
            multipart_request("/api/upload", &[("files", "page.png", b"bytes".as_slice())]);
        app.clone().oneshot(upload).await.unwrap();

        let addr = stalling_endpoint(Duration::from_secs(2)).await;
        std::fs::write(
            settings.env_file_path(),
            format!("LMSTUDIO_API_ENDPOINT=http://{}/v1\n", addr),
        )
        .unwrap();

        let job = tokio::spawn(app.clone().oneshot(process_extract_request()));

        // Let staging finish and the provider call get underway
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The deck must not be held for the whole provider exchange
        let listing = tokio::time::timeout(
            Duration::from_millis(500),
            app.clone()
                .oneshot(Request::get("/api/images").body(Body::empty()).unwrap()),
        )
        .await
        .expect("deck api blocked while extraction was running");
        assert_eq!(listing.unwrap().status(), StatusCode::OK);

        job.abort();
    }

    #[tokio::test]
    async fn test_documents_listing_and_conversation() {
        let dir = tempdir().unwrap();
        let (app, settings) = setup_test_app(dir.path());

        Document::new("Travel Notes".to_string(), "# Travel Notes\n\nbody".to_string())
            .save(&settings.output_dir)
            .unwrap();

        let response = app
            .clone()
            .oneshot(Request::get("/api/documents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let docs = json["documents"].as_array().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["folder"], "Travel Notes");

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/documents/Travel%20Notes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["content"].as_str().unwrap().contains("body"));

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/documents/Travel%20Notes/conversation")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"user": "shorten it", "assistant": "done"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/documents/Travel%20Notes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["conversation"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_document_missing_is_404() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let response = app
            .oneshot(
                Request::get("/api/documents/NoSuchDoc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_validation() {
        let dir = tempdir().unwrap();
        let (app, _) = setup_test_app(dir.path());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/settings")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"LMSTUDIO_MODEL_NAME": "gemma-3-12b-it"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["settings"]["LMSTUDIO_MODEL_NAME"], "gemma-3-12b-it");

        // a Zhipu key without the id.secret separator is rejected
        let response = app
            .oneshot(
                Request::post("/api/settings")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"ZHIPUAI_API_KEY": "nodot"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
