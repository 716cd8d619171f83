//! HTTP service: a multipart upload endpoint in front of the batch pipeline.
//!
//! ```text
//! POST /api/extract   multipart: apiKey=<key>, files=<part>...  → {"results", "stats"}
//! GET  /api/health                                               → {"status", "version"}
//! ```
//!
//! Each request carries its own Gemini API key; the server holds no
//! credential of its own. A missing key or an empty file list is a `400`
//! with `{"error": "..."}`. Once the batch starts, per-file and per-page
//! failures come back as degraded entries in a `200` response.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::extract_batch;
use crate::output::BatchResult;
use crate::pipeline::input::SourceFile;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Default upload limit for one request, in bytes.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Rendering and model settings applied to every request. Its
    /// credentials are ignored; each request supplies its own key.
    pub base_config: Arc<ExtractionConfig>,
}

impl AppState {
    pub fn new(base_config: ExtractionConfig) -> Self {
        Self {
            base_config: Arc::new(base_config),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Error body returned for rejected requests.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(e: ExtractError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let message = match e {
            // The default wording names CLI flags.
            ExtractError::MissingCredential => "apiKey form field is required".to_string(),
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::bad_request(format!("Malformed multipart body: {}", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Build the API router.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/extract", post(extract_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn start_server(addr: &str, state: AppState, max_upload_bytes: usize) -> Result<(), std::io::Error> {
    info!("Starting comment extraction service on {}", addr);

    let app = build_router(state, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn extract_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchResult>, ApiError> {
    let upload = read_upload(multipart).await?;

    let api_key = upload
        .api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(ExtractError::MissingCredential)?;
    if upload.files.is_empty() {
        return Err(ExtractError::EmptyBatch.into());
    }

    let mut config = (*state.base_config).clone();
    config.api_key = Some(api_key);
    config.provider = None;
    config.provider_name = None;

    info!("Extract request: {} file(s)", upload.files.len());
    let batch = extract_batch(upload.files, &config).await.map_err(|e| {
        warn!("Extract request rejected: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(batch))
}

struct Upload {
    api_key: Option<String>,
    files: Vec<SourceFile>,
}

/// Collect the `apiKey` field and every file part. Unknown fields are skipped.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload {
        api_key: None,
        files: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "apiKey" => upload.api_key = Some(field.text().await?),
            "files" | "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                // Browsers send an empty unnamed part when no file was chosen.
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                let file_name = if file_name.is_empty() { "upload".to_string() } else { file_name };
                upload.files.push(SourceFile::new(file_name, mime_type, data.to_vec()));
            }
            _ => {}
        }
    }

    Ok(upload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn multipart_body(api_key: Option<&str>, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(key) = api_key {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"apiKey\"\r\n\r\n{key}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, mime, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn extract_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/extract")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn app() -> Router {
        build_router(AppState::new(ExtractionConfig::default()), DEFAULT_MAX_UPLOAD_BYTES)
    }

    async fn error_message(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let resp = app()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn missing_api_key_is_400() {
        let body = multipart_body(None, &[("a.png", "image/png", b"png")]);
        let resp = app().oneshot(extract_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let message = error_message(resp).await;
        assert_eq!(message, "apiKey form field is required");
        assert!(!message.contains("--"));
    }

    #[tokio::test]
    async fn blank_api_key_is_400() {
        let body = multipart_body(Some("   "), &[("a.png", "image/png", b"png")]);
        let resp = app().oneshot(extract_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn no_files_is_400() {
        let body = multipart_body(Some("AIza-test"), &[]);
        let resp = app().oneshot(extract_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(error_message(resp).await.contains("No files"));
    }

    #[tokio::test]
    async fn empty_file_input_counts_as_no_files() {
        let body = multipart_body(Some("AIza-test"), &[("", "application/octet-stream", b"")]);
        let resp = app().oneshot(extract_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(error_message(resp).await.contains("No files"));
    }

    #[tokio::test]
    async fn non_multipart_body_is_rejected() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/extract")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }
}
