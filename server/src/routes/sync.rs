//! Sync endpoint routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{delete, get},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::handlers::{handle_delete, handle_pull, handle_pull_since, handle_push, DeleteTaskResponse};
use crate::AppState;
use ordo_sync::sync::{PullResponse, PushRequest, PushResponse};

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/tasks", get(pull_handler).post(push_handler))
        .route("/sync/tasks/since/{timestamp}", get(pull_since_handler))
        .route("/sync/tasks/{id}", delete(delete_handler))
}

/// POST /sync/tasks - Upsert tasks from a client.
async fn push_handler(
    State(state): State<AppState>,
    request: std::result::Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>> {
    let Json(request) = request.map_err(|rejection| AppError::BadRequest {
        error: "Tasks must be an array".to_string(),
        details: Some(rejection.body_text()),
    })?;
    let response = handle_push(&state.pool, request).await?;
    Ok(Json(response))
}

/// GET /sync/tasks - Every stored task.
async fn pull_handler(State(state): State<AppState>) -> Result<Json<PullResponse>> {
    let response = handle_pull(&state.pool).await?;
    Ok(Json(response))
}

/// GET /sync/tasks/since/{timestamp} - Tasks updated since a point in time.
async fn pull_since_handler(
    State(state): State<AppState>,
    Path(timestamp): Path<String>,
) -> Result<Json<PullResponse>> {
    let response = handle_pull_since(&state.pool, timestamp).await?;
    Ok(Json(response))
}

/// DELETE /sync/tasks/{id} - Remove a task.
async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteTaskResponse>> {
    let response = handle_delete(&state.pool, &id).await?;
    Ok(Json(response))
}
