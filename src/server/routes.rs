//! HTTP surface for session synchronization.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check
//! - `POST /sessions`: Create a session with a fresh ID
//! - `GET /sessions/{id}/diff`: Next payload for the client (204 when up to date)
//! - `POST /sessions/{id}/ack`: Acknowledge a sequence number
//! - `POST /sessions/{id}/stage`: Stage a value into a section
//! - `POST /sessions/{id}/search_results`: Stage results for a query
//! - `POST /sessions/{id}/item_details`: Stage details for an item
//! - `POST /sessions/{id}/commit`: Commit staged changes
//! - `GET /sessions/{id}/state`: Inspect the whole session
//! - `DELETE /sessions/{id}`: Drop the session

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::CommittedEntry;
use crate::sync::{SessionHub, SyncError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: SessionHub,
}

/// Builds the application router.
pub fn router(hub: SessionHub) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", axum::routing::delete(delete_session))
        .route("/sessions/{id}/diff", get(diff))
        .route("/sessions/{id}/ack", post(acknowledge))
        .route("/sessions/{id}/stage", post(stage))
        .route("/sessions/{id}/search_results", post(search_results))
        .route("/sessions/{id}/item_details", post(item_details))
        .route("/sessions/{id}/commit", post(commit))
        .route("/sessions/{id}/state", get(session_state))
        .with_state(AppState { hub })
}

// ============================================================================
// Errors
// ============================================================================

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// A [`SyncError`] rendered as an HTTP response.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            SyncError::Schema(_) => (StatusCode::UNPROCESSABLE_ENTITY, "schema_violation"),
            SyncError::AckBelowPushed { .. } | SyncError::AckBeyondPending { .. } => {
                (StatusCode::CONFLICT, "sequence_error")
            }
            SyncError::InvalidSessionId(_) => (StatusCode::BAD_REQUEST, "invalid_session_id"),
            e if e.is_retryable() => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorBody {
                error: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    state.hub.session(&session_id)?.snapshot().await?;

    Ok((StatusCode::CREATED, Json(SessionCreated { session_id })))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.hub.session(&id)?.clear().await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

async fn diff(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.hub.session(&id)?.calculate_diff().await? {
        Some(payload) => Ok(Json(payload).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckRequest {
    pub seq_num: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub pushed_seq_num: u64,
}

async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AckRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let cds = state.hub.session(&id)?;
    cds.acknowledge(request.seq_num).await?;

    Ok(Json(AckResponse {
        pushed_seq_num: cds.get_pushed_seq_num().await?,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StageRequest {
    pub section: String,
    pub key: String,
    pub value: Value,
}

async fn stage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<StageRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .hub
        .session(&id)?
        .stage(&request.section, &request.key, request.value)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResultsRequest {
    pub query: String,
    pub results: Vec<Value>,
}

async fn search_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SearchResultsRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .hub
        .session(&id)?
        .add_search_results(&request.query, request.results)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemDetailsRequest {
    pub item_id: String,
    pub details: Map<String, Value>,
}

async fn item_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ItemDetailsRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .hub
        .session(&id)?
        .add_item_details(&request.item_id, request.details)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    /// `None` when nothing was staged
    pub seq_num: Option<u64>,
}

async fn commit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommitResponse>, ApiError> {
    let seq_num = state.hub.session(&id)?.commit().await?;
    Ok(Json(CommitResponse { seq_num }))
}

/// Everything the server holds for a session
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub pushed_seq_num: u64,
    pub pushed_data: Value,
    pub pending: Vec<CommittedEntry>,
    pub staged: Map<String, Value>,
    pub effective: Value,
}

async fn session_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionState>, ApiError> {
    let record = state.hub.session(&id)?.snapshot().await?;

    Ok(Json(SessionState {
        effective: record.effective_state(),
        pushed_seq_num: record.baseline.pushed_seq_num,
        pushed_data: record.baseline.pushed_snapshot,
        pending: record.versions.peek_pending().to_vec(),
        staged: record.versions.staged().clone(),
    }))
}
