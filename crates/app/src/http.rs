use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_qa_core::{ChatTurn, DocumentFingerprint, QaError, QaSession, QueryAnswer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

const UPLOAD_FIELD: &str = "pdf";

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<QaSession>,
    pub upload_dir: Arc<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub document: Option<DocumentFingerprint>,
}

pub fn create_app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/query", post(query_handler))
        .route("/history", get(history_handler))
        .route("/pdfs", get(pdfs_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut multipart = multipart.map_err(ApiError::from_display)?;
    let mut stored = None;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::from_display)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let data = field.bytes().await.map_err(ApiError::from_display)?;
        let path = state.upload_dir.join(format!("{}.pdf", Uuid::new_v4()));
        tokio::fs::write(&path, &data)
            .await
            .map_err(|error| ApiError::from(QaError::Io(error)))?;

        info!(file = %original_name, bytes = data.len(), path = %path.display(), "stored upload");
        stored = Some(path);
        break;
    }

    let path = stored.ok_or_else(|| {
        ApiError(format!("multipart field '{UPLOAD_FIELD}' with a PDF file is required"))
    })?;
    state.session.process_pdf(&path).await?;

    Ok(Json(MessageResponse {
        message: "PDF processed successfully".to_string(),
    }))
}

async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryAnswer>, ApiError> {
    let Json(request) = payload.map_err(ApiError::from_display)?;
    let answer = state.session.query_pdf(&request.question).await?;
    Ok(Json(answer))
}

async fn history_handler(State(state): State<AppState>) -> Json<Vec<ChatTurn>> {
    Json(state.session.history().await)
}

// No persistence layer yet, so there is nothing to list.
async fn pdfs_handler() -> Json<Vec<Value>> {
    Json(Vec::new())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        ready: state.session.is_ready().await,
        document: state.session.document().await,
    })
}

/// Every failure surfaces as `500 {"error": message}`.
#[derive(Debug)]
pub struct ApiError(String);

impl ApiError {
    fn from_display(error: impl std::fmt::Display) -> Self {
        Self(error.to_string())
    }
}

impl From<QaError> for ApiError {
    fn from(error: QaError) -> Self {
        Self(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0 })),
        )
            .into_response()
    }
}
