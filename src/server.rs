//! HTTP server for the assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart document upload; indexes it |
//! | `POST` | `/chat` | `{ "message": "..." }` → `{ "response": "..." }` |
//! | `GET`  | `/count_index` | Total records in the index |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_input", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `invalid_input` (400), `ingestion_failed` (500),
//! `generation_failed` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end on
//! another port can call the API.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::engine::RagEngine;
use crate::error::RagError;
use crate::extract::DocumentKind;

#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine>,
}

/// Open the engine from `config` and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(RagEngine::open(config).await?);
    run_server_with_engine(config, engine).await
}

/// Serve an already-built engine until Ctrl-C, then close its index.
pub async fn run_server_with_engine(config: &Config, engine: Arc<RagEngine>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(Arc::clone(&engine), config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Suriel listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down, closing index");
    engine.close().await?;
    Ok(())
}

pub fn router(engine: Arc<RagEngine>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/count_index", get(handle_count))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(AppState { engine })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn invalid_input(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_input",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let code = match &err {
            RagError::InvalidInput(_) => return invalid_input(err.to_string()),
            RagError::IngestionFailed { .. } => "ingestion_failed",
            RagError::GenerationFailed { .. } => "generation_failed",
            _ => "internal",
        };
        tracing::error!(error = %err, code, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
    chunks: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid_input(format!("malformed multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);

        let kind = DocumentKind::detect(&filename, content_type.as_deref()).ok_or_else(|| {
            invalid_input(format!(
                "unsupported file type: {} (accepted: PDF, DOCX, TXT, Markdown)",
                filename
            ))
        })?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| invalid_input(format!("cannot read upload: {}", e)))?;

        let chunks = state
            .engine
            .ingest_document(&filename, bytes.to_vec(), kind)
            .await?;

        return Ok(Json(UploadResponse {
            message: format!("{} indexed successfully", filename),
            filename,
            chunks,
        }));
    }

    Err(invalid_input("no file field in upload"))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(invalid_input("message must not be empty"));
    }
    let response = state.engine.chat(&req.message).await?;
    Ok(Json(ChatResponse { response }))
}

// ============ GET /count_index ============

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

async fn handle_count(State(state): State<AppState>) -> Result<Json<CountResponse>, AppError> {
    let count = state.engine.count().await?;
    Ok(Json(CountResponse { count }))
}
