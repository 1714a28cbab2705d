//! Delete handler - removes a task by id.

use crate::db;
use crate::error::{AppError, Context, Result};
use ordo_sync::sync::SyncRecord;
use serde::Serialize;
use sqlx::PgPool;

/// Response for a successful delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTaskResponse {
    pub success: bool,
    pub message: String,
    pub deleted_task: SyncRecord,
}

/// Delete a task. An unknown id is reported as not found.
pub async fn handle_delete(pool: &PgPool, id: &str) -> Result<DeleteTaskResponse> {
    let deleted = db::delete_task(pool, id)
        .await
        .context("Failed to delete task")?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    tracing::info!(task_id = %id, "Task deleted");
    Ok(DeleteTaskResponse {
        success: true,
        message: format!("Task {id} deleted successfully"),
        deleted_task: deleted.into(),
    })
}
