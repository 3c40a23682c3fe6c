use crate::state::AppState;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use pdf_vector_core::{BackendError, ChunkingConfig, Embedder, Upload, VectorStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "pdf-vector";
const NDJSON: &str = "application/x-ndjson";

/// Error body returned before any streaming starts: `{"error": "..."}`.
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

    fn too_large(limit: usize) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: format!("file too large: uploads are limited to {limit} bytes"),
        }
    }

    fn from_multipart(error: MultipartError, limit: usize) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::too_large(limit)
        } else {
            Self::bad_request(format!("failed to parse form: {}", error.body_text()))
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(error: BackendError) -> Self {
        let status = match &error {
            error if error.is_invalid_input() => StatusCode::BAD_REQUEST,
            BackendError::Status { .. }
            | BackendError::Transport(_)
            | BackendError::InvalidResponse { .. }
            | BackendError::EmptyCollectionId(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), message = %self.message, "request failed");
        } else {
            warn!(status = self.status.as_u16(), message = %self.message, "request rejected");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router<E, S>(state: Arc<AppState<E, S>>) -> Router
where
    E: Embedder + 'static,
    S: VectorStore + 'static,
{
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/reset", get(reset::<E, S>).post(reset::<E, S>))
        .route("/api/upload", post(upload::<E, S>).layer(upload_limit))
        .route("/api/search", get(search::<E, S>))
        .route("/api/stats", get(stats::<E, S>))
        .route("/api/files/:filename", delete(delete_file::<E, S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        collection = %state.config.collection,
        max_upload_bytes = state.max_upload_bytes,
        "http server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn reset<E, S>(State(state): State<Arc<AppState<E, S>>>) -> Result<Json<Value>, ApiError>
where
    E: Embedder + 'static,
    S: VectorStore + 'static,
{
    state.reset.reset().await?;
    Ok(Json(json!({
        "status": "reset successful",
        "collection": state.reset.collection(),
    })))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Reads the multipart form, then streams the ingestion progress as
/// newline-delimited JSON while the pipeline runs in its own task.
async fn upload<E, S>(
    State(state): State<Arc<AppState<E, S>>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError>
where
    E: Embedder + 'static,
    S: VectorStore + 'static,
{
    let limit = state.max_upload_bytes;
    if declared_length(&headers).is_some_and(|length| length > limit) {
        return Err(ApiError::too_large(limit));
    }

    let mut file = None;
    let mut chunk_size = None;
    let mut chunk_stride = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::from_multipart(error, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| ApiError::from_multipart(error, limit))?;
                file = Some((filename, bytes.to_vec()));
            }
            "chunkSize" => chunk_size = field.text().await.ok(),
            "chunkStride" => chunk_stride = field.text().await.ok(),
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(ApiError::bad_request("failed to get file: no file field in form"));
    };
    if filename.is_empty() {
        return Err(ApiError::bad_request("failed to get file: missing filename"));
    }

    let upload = Upload {
        filename,
        bytes,
        chunking: ChunkingConfig::from_form_values(chunk_size.as_deref(), chunk_stride.as_deref()),
    };

    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        // The terminal progress event already carries the outcome.
        let _ = state.ingestion.ingest(upload, &sender).await;
    });

    let lines = UnboundedReceiverStream::new(receiver)
        .map(|event| Ok::<_, Infallible>(event.to_ndjson_line()));

    Ok((
        [(CONTENT_TYPE, NDJSON), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(lines),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

async fn search<E, S>(
    State(state): State<Arc<AppState<E, S>>>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError>
where
    E: Embedder + 'static,
    S: VectorStore + 'static,
{
    let query = params.q.unwrap_or_default();
    let response = state.search.search(&query).await?;
    Ok(Json(response).into_response())
}

async fn stats<E, S>(State(state): State<Arc<AppState<E, S>>>) -> Result<Response, ApiError>
where
    E: Embedder + 'static,
    S: VectorStore + 'static,
{
    Ok(Json(state.stats.stats().await?).into_response())
}

async fn delete_file<E, S>(
    State(state): State<Arc<AppState<E, S>>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError>
where
    E: Embedder + 'static,
    S: VectorStore + 'static,
{
    Ok(Json(state.files.delete_file(&filename).await?).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use pdf_vector_core::testing::{single_page_pdf, InMemoryStore, ScriptedEmbedder};
    use pdf_vector_core::PipelineConfig;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdf-vector-boundary";

    type TestState = AppState<ScriptedEmbedder, InMemoryStore>;

    fn state() -> (TestState, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::default());
        let state = AppState::with_backends(
            Arc::new(ScriptedEmbedder::default()),
            Arc::clone(&store),
            PipelineConfig::default(),
        );
        (state, store)
    }

    fn app() -> (Router, Arc<InMemoryStore>) {
        let (state, store) = state();
        (router(Arc::new(state)), store)
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match filename {
                Some(filename) => format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
                ),
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn ndjson(text: &str) -> Vec<Value> {
        text.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn health_reports_service_and_version() {
        let (app, _) = app();
        let response = app.oneshot(request("GET", "/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn search_without_query_is_bad_request() {
        let (app, _) = app();
        let response = app.oneshot(request("GET", "/api/search")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn search_returns_parallel_arrays() {
        let (app, store) = app();
        store.insert_raw("documents", "pump chunk", Some(json!({"filename": "a.pdf", "chunk_num": 1})));

        let response = app
            .oneshot(request("GET", "/api/search?q=pump"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["documents"], json!([["pump chunk"]]));
        assert_eq!(body["metadatas"][0][0]["filename"], "a.pdf");
        assert_eq!(body["ids"][0].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upload_without_file_is_bad_request() {
        let (app, _) = app();
        let body = multipart_body(&[("chunkSize", None, b"50")]);

        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreadable_pdf_streams_terminal_error_line() {
        let (app, store) = app();
        let body = multipart_body(&[
            ("file", Some("broken.pdf"), b"this is not a pdf"),
            ("chunkSize", None, b"50"),
        ]);

        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], NDJSON);
        let lines = ndjson(&body_text(response).await);
        assert_eq!(lines.first().unwrap()["status"], "Reading PDF file...");
        assert!(lines.last().unwrap()["error"].is_string());
        assert_eq!(store.backend_calls(), 0);
    }

    #[tokio::test]
    async fn valid_pdf_upload_streams_completion_and_stores_chunks() {
        let (app, store) = app();
        let pdf = single_page_pdf("Hydraulic pump maintenance");
        let body = multipart_body(&[
            ("file", Some("pump.pdf"), &pdf),
            ("chunkSize", None, b"2"),
            ("chunkStride", None, b"2"),
        ]);

        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let lines = ndjson(&body_text(response).await);
        assert_eq!(
            lines.last().unwrap(),
            &json!({"status": "completed", "filename": "pump.pdf", "chunkSize": 2, "chunkStride": 2})
        );
        assert!(lines
            .iter()
            .any(|line| line["status"] == "Reading PDF page 1/1"));

        let entries = store.entries("documents");
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|entry| {
            entry.metadata.as_ref().unwrap()["filename"] == json!("pump.pdf")
        }));
    }

    #[tokio::test]
    async fn large_upload_within_limit_reaches_the_pipeline() {
        let (app, _) = app();
        let large = vec![b'x'; 40 * 1024 * 1024];
        let body = multipart_body(&[("file", Some("large.pdf"), &large)]);

        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let lines = ndjson(&body_text(response).await);
        assert!(lines.last().unwrap()["error"].is_string());
    }

    #[tokio::test]
    async fn upload_over_limit_is_payload_too_large() {
        let (state, store) = state();
        let app = router(Arc::new(state.with_max_upload_bytes(1024)));
        let body = multipart_body(&[("file", Some("big.pdf"), &[b'x'; 4096])]);

        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let message = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(message.contains("too large"));
        assert_eq!(store.backend_calls(), 0);
    }

    #[tokio::test]
    async fn stats_reports_files_and_counts() {
        let (app, store) = app();
        store.insert_raw("documents", "a1", Some(json!({"filename": "a.pdf"})));
        store.insert_raw("documents", "a2", Some(json!({"filename": "a.pdf"})));
        store.insert_raw("documents", "b1", Some(json!({"filename": "b.pdf"})));

        let response = app.oneshot(request("GET", "/api/stats")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "total_chunks": 3,
                "total_files": 2,
                "files": ["a.pdf", "b.pdf"],
                "file_chunk_counts": {"a.pdf": 2, "b.pdf": 1},
            })
        );
    }

    #[tokio::test]
    async fn delete_file_removes_its_chunks() {
        let (app, store) = app();
        store.insert_raw("documents", "a1", Some(json!({"filename": "a.pdf"})));
        store.insert_raw("documents", "b1", Some(json!({"filename": "b.pdf"})));

        let response = app
            .oneshot(request("DELETE", "/api/files/a.pdf"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "deleted", "filename": "a.pdf"})
        );
        let remaining = store.entries("documents");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].document, "b1");
    }

    #[tokio::test]
    async fn reset_drops_the_collection() {
        let (app, store) = app();
        store.insert_raw("documents", "a1", Some(json!({"filename": "a.pdf"})));

        let response = app.oneshot(request("POST", "/api/reset")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "reset successful", "collection": "documents"})
        );
        assert!(store.entries("documents").is_empty());
    }

    #[test]
    fn backend_errors_map_to_gateway_status() {
        let upstream = ApiError::from(BackendError::Status {
            backend: "chroma".to_string(),
            status: 500,
            body: "boom".to_string(),
        });
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);

        let invalid = ApiError::from(BackendError::EmptyQuery);
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    }
}
