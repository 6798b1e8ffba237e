//! HTTP API for the chat front-end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/categories` | FAQ categories |
//! | `POST` | `/api/chat` | FAQ answer, consultation text turn, or mode hint |
//! | `POST` | `/api/consultation` | Structured consultation turn |
//! | `POST` | `/upload` | Multipart document upload and ingestion |
//! | `GET`  | `/api/status` | Store sizes and session counts |
//! | `POST` | `/api/clear` | Clear knowledge or context |
//! | `POST` | `/api/process-uploads` | Ingest pending files in the uploads directory |
//! | `POST` | `/api/clear-processed-files` | Forget which uploads were ingested |
//! | `POST` | `/api/search` | Raw semantic search over the knowledge base |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `llm_disabled` (400),
//! `embeddings_disabled` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser front-end
//! can be served from a different origin.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assistant::{Assistant, AssistantStatus};
use crate::config::Config;
use crate::consultation::{ActionType, ConsultationEngine, ConsultationReply};
use crate::ingest::{self, IngestStats};
use crate::models::SearchHit;
use crate::tracker::ProcessedFiles;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub assistant: Arc<Assistant>,
    pub consultation: Arc<Mutex<ConsultationEngine>>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            config: Arc::new(assistant.config().clone()),
            consultation: assistant.consultation(),
            assistant,
        }
    }
}

/// Build the router with all routes and middleware attached.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/categories", get(handle_categories))
        .route("/api/chat", post(handle_chat))
        .route("/api/consultation", post(handle_consultation))
        .route(
            "/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/status", get(handle_status))
        .route("/api/clear", post(handle_clear))
        .route("/api/process-uploads", post(handle_process_uploads))
        .route("/api/clear-processed-files", post(handle_clear_processed))
        .route("/api/search", post(handle_search))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Opens the store, ingests pending uploads when
/// `uploads.process_on_startup` is set, then binds to `[server].bind` and
/// serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let assistant = Arc::new(Assistant::from_config(config.clone())?);

    if config.uploads.process_on_startup {
        let tracker = ProcessedFiles::new(&config.uploads.processed_files);
        if ingest::has_unprocessed(&config.uploads, &tracker) {
            match ingest::process_uploads(&assistant, false).await {
                Ok(stats) => tracing::info!(
                    processed = stats.processed,
                    failed = stats.failed,
                    "startup ingestion done"
                ),
                Err(e) => tracing::warn!(error = %e, "startup ingestion failed"),
            }
        }
    }

    let app = build_router(AppState::new(assistant));

    tracing::info!(addr = %bind_addr, "server listening");
    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

fn require_embeddings(config: &Config) -> Result<(), AppError> {
    if config.embedding.is_enabled() {
        return Ok(());
    }
    Err(AppError {
        status: StatusCode::BAD_REQUEST,
        code: "embeddings_disabled".to_string(),
        message: "Embedding provider is disabled".to_string(),
    })
}

fn require_llm(config: &Config) -> Result<(), AppError> {
    if config.llm.is_enabled() {
        return Ok(());
    }
    Err(AppError {
        status: StatusCode::BAD_REQUEST,
        code: "llm_disabled".to_string(),
        message: "LLM provider is disabled".to_string(),
    })
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| bad_request(format!("Invalid JSON body: {}", e.body_text())))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
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

// ============ GET /api/categories ============

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<String>,
}

async fn handle_categories(State(state): State<AppState>) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: state.assistant.categories().to_vec(),
    })
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: Option<String>,
    mode: Option<String>,
    category: Option<String>,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// A message and a mode are required; FAQ mode also needs a category.
async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let req = json_body(body)?;
    let message = non_empty(req.message).ok_or_else(|| bad_request("message is required"))?;
    let mode = non_empty(req.mode).ok_or_else(|| bad_request("mode is required"))?;
    let category = non_empty(req.category);

    if mode.eq_ignore_ascii_case("faq") {
        if category.is_none() {
            return Err(bad_request("category is required in FAQ mode"));
        }
        require_embeddings(&state.config)?;
        require_llm(&state.config)?;
    }

    let response = state
        .assistant
        .generate_response(
            &message,
            Some(mode.as_str()),
            category.as_deref(),
            req.session_id.as_deref(),
        )
        .await
        .map_err(internal)?;

    Ok(Json(ChatResponse { response }))
}

// ============ POST /api/consultation ============

#[derive(Deserialize)]
struct ConsultationRequest {
    #[serde(default)]
    message: String,
    action_type: Option<String>,
    session_id: Option<String>,
}

async fn handle_consultation(
    State(state): State<AppState>,
    body: Result<Json<ConsultationRequest>, JsonRejection>,
) -> Result<Json<ConsultationReply>, AppError> {
    let req = json_body(body)?;
    let session_id =
        non_empty(req.session_id).ok_or_else(|| bad_request("session_id is required"))?;
    let action: ActionType = req
        .action_type
        .as_deref()
        .unwrap_or("text")
        .parse()
        .map_err(bad_request)?;

    let reply = state
        .consultation
        .lock()
        .await
        .handle_message(&req.message, &session_id, action);
    Ok(Json(reply))
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
    chunks: usize,
}

/// Multipart fields: `file` (the document) and `category`.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut category: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read file: {}", e)))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("category") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read category: {}", e)))?;
                category = non_empty(Some(text));
            }
            _ => {}
        }
    }

    let (original_name, bytes) = file
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| bad_request("No file selected"))?;
    if !state.config.uploads.is_allowed(&original_name) {
        return Err(bad_request(format!(
            "File type not allowed. Allowed: {}",
            state.config.uploads.allowed_extensions.join(", ")
        )));
    }
    let category = category.ok_or_else(|| bad_request("category is required"))?;
    require_embeddings(&state.config)?;

    let (filename, chunks) = ingest::ingest_upload(&state.assistant, &original_name, &bytes, &category)
        .await
        .map_err(internal)?;

    Ok(Json(UploadResponse {
        message: format!(
            "File {} uploaded and processed successfully with category: {}",
            filename, category
        ),
        filename,
        chunks,
    }))
}

// ============ GET /api/status ============

async fn handle_status(State(state): State<AppState>) -> Json<AssistantStatus> {
    Json(state.assistant.status().await)
}

// ============ POST /api/clear ============

#[derive(Deserialize, Default)]
struct ClearRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_clear(
    State(state): State<AppState>,
    body: Result<Json<ClearRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => ClearRequest::default(),
        Err(e) => return Err(bad_request(format!("Invalid JSON body: {}", e.body_text()))),
    };

    let message = match req.kind.as_deref().unwrap_or("knowledge") {
        "knowledge" => {
            state.assistant.clear_knowledge().await.map_err(internal)?;
            "Knowledge base cleared"
        }
        "context" => {
            state.assistant.clear_context().await.map_err(internal)?;
            "Conversation context cleared"
        }
        other => {
            return Err(bad_request(format!(
                "Unknown clear type: '{}'. Must be knowledge or context.",
                other
            )))
        }
    };
    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

// ============ POST /api/process-uploads ============

#[derive(Serialize)]
struct ProcessUploadsResponse {
    message: String,
    stats: IngestStats,
}

async fn handle_process_uploads(
    State(state): State<AppState>,
) -> Result<Json<ProcessUploadsResponse>, AppError> {
    require_embeddings(&state.config)?;
    let stats = ingest::process_uploads(&state.assistant, false)
        .await
        .map_err(internal)?;
    Ok(Json(ProcessUploadsResponse {
        message: format!(
            "Processed {} files ({} failed, {} skipped)",
            stats.processed, stats.failed, stats.skipped
        ),
        stats,
    }))
}

// ============ POST /api/clear-processed-files ============

async fn handle_clear_processed(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    ProcessedFiles::new(&state.config.uploads.processed_files)
        .clear()
        .map_err(internal)?;
    Ok(Json(MessageResponse {
        message: "Processed files list cleared".to_string(),
    }))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: Option<String>,
    limit: Option<usize>,
    category: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let req = json_body(body)?;
    let query = non_empty(req.query).ok_or_else(|| bad_request("query must not be empty"))?;
    let limit = req
        .limit
        .unwrap_or(state.config.retrieval.knowledge_limit);
    if limit == 0 {
        return Err(bad_request("limit must be >= 1"));
    }
    let category = non_empty(req.category);
    if let Some(category) = &category {
        if !state.config.categories.iter().any(|c| c == category) {
            return Err(not_found(format!("Unknown category: {}", category)));
        }
    }
    require_embeddings(&state.config)?;

    let results = state
        .assistant
        .search(&query, limit, category.as_deref())
        .await
        .map_err(internal)?;
    Ok(Json(SearchResponse { results }))
}
