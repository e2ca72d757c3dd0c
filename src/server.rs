//! HTTP server.
//!
//! JSON API over the chat, document-admin and analytics operations. There
//! is no authentication layer; put the server behind one.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | Route one turn: `{conversation_id?, user_input}` |
//! | `GET`  | `/chat/{conversation_id}` | Full conversation history |
//! | `GET`  | `/admin/documents` | List documents |
//! | `POST` | `/admin/documents` | Upload a server-local file: `{path}` |
//! | `POST` | `/admin/documents/{id}/toggle` | Set the active flag: `{active}` |
//! | `DELETE` | `/admin/documents/{id}` | Delete a document |
//! | `POST` | `/admin/index/rebuild` | Force an index rebuild |
//! | `GET`  | `/admin/analytics/documents` | Per-document usage counts |
//! | `GET`  | `/admin/analytics/conversations` | Per-conversation activity |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "user_input must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `payload_too_large` (413), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use faq_harness_core::models::{Document, DocumentId, Turn};

use crate::admin::{AdminError, DeletedBody, DocumentBody, Mutation};
use crate::app::App;
use crate::chat::ChatResponse;
use crate::index::IndexReport;
use crate::stats::{ConversationActivity, DocumentUsage};

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(app: App) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let router = build_router(Arc::new(app));

    info!(%bind_addr, "HTTP server listening");
    println!("FAQ server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// All routes over shared state.
pub fn build_router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/chat/{conversation_id}", get(handle_history))
        .route(
            "/admin/documents",
            get(handle_list_documents).post(handle_upload),
        )
        .route("/admin/documents/{id}/toggle", post(handle_toggle))
        .route(
            "/admin/documents/{id}",
            axum::routing::delete(handle_delete),
        )
        .route("/admin/index/rebuild", post(handle_rebuild))
        .route("/admin/analytics/documents", get(handle_document_usage))
        .route(
            "/admin/analytics/conversations",
            get(handle_conversation_activity),
        )
        .layer(cors)
        .with_state(app)
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

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    app_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        format!("{:#}", err),
    )
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        let message = err.to_string();
        match err {
            AdminError::NotFound(_) => app_error(StatusCode::NOT_FOUND, "not_found", message),
            AdminError::DuplicateName(_) => app_error(StatusCode::CONFLICT, "conflict", message),
            AdminError::TooLarge { .. } => {
                app_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
            }
            AdminError::UnsupportedType(_) | AdminError::Source { .. } => bad_request(message),
            AdminError::Other(e) => internal(e),
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

// ============ Chat ============

#[derive(Deserialize)]
struct ChatRequest {
    /// A new conversation is started when absent.
    #[serde(default)]
    conversation_id: Option<String>,
    user_input: String,
}

#[derive(Serialize)]
struct ChatReply {
    conversation_id: String,
    #[serde(flatten)]
    chat: ChatResponse,
}

async fn handle_chat(
    State(app): State<Arc<App>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    if req.user_input.trim().is_empty() {
        return Err(bad_request("user_input must not be empty"));
    }
    let conversation_id = match req.conversation_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => uuid::Uuid::new_v4().to_string(),
    };

    let chat = app
        .chat
        .chat(&conversation_id, &req.user_input)
        .await
        .map_err(internal)?;
    Ok(Json(ChatReply {
        conversation_id,
        chat,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    conversation_id: String,
    chat_history: Vec<Turn>,
}

async fn handle_history(
    State(app): State<Arc<App>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let chat_history = app
        .history
        .fetch_all(&conversation_id)
        .await
        .map_err(internal)?;
    Ok(Json(HistoryResponse {
        conversation_id,
        chat_history,
    }))
}

// ============ Documents ============

#[derive(Serialize)]
struct DocumentList {
    documents: Vec<Document>,
}

async fn handle_list_documents(
    State(app): State<Arc<App>>,
) -> Result<Json<DocumentList>, AppError> {
    let documents = app.admin.list().await?;
    Ok(Json(DocumentList { documents }))
}

#[derive(Deserialize)]
struct UploadRequest {
    path: PathBuf,
}

async fn handle_upload(
    State(app): State<Arc<App>>,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<Mutation<DocumentBody>>), AppError> {
    let created = app.admin.upload(&req.path).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
struct ToggleRequest {
    active: bool,
}

async fn handle_toggle(
    State(app): State<Arc<App>>,
    Path(id): Path<DocumentId>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<Mutation<DocumentBody>>, AppError> {
    Ok(Json(app.admin.set_active(id, req.active).await?))
}

async fn handle_delete(
    State(app): State<Arc<App>>,
    Path(id): Path<DocumentId>,
) -> Result<Json<Mutation<DeletedBody>>, AppError> {
    Ok(Json(app.admin.delete(id).await?))
}

async fn handle_rebuild(State(app): State<Arc<App>>) -> Result<Json<IndexReport>, AppError> {
    Ok(Json(app.admin.rebuild_index().await?))
}

// ============ Analytics ============

#[derive(Serialize)]
struct DocumentUsageResponse {
    documents: Vec<DocumentUsage>,
}

async fn handle_document_usage(
    State(app): State<Arc<App>>,
) -> Result<Json<DocumentUsageResponse>, AppError> {
    let documents = app.usage.document_usage().await.map_err(internal)?;
    Ok(Json(DocumentUsageResponse { documents }))
}

#[derive(Serialize)]
struct ConversationActivityResponse {
    conversations: Vec<ConversationActivity>,
}

async fn handle_conversation_activity(
    State(app): State<Arc<App>>,
) -> Result<Json<ConversationActivityResponse>, AppError> {
    let conversations = app.usage.conversation_activity().await.map_err(internal)?;
    Ok(Json(ConversationActivityResponse { conversations }))
}
