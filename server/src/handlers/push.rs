//! Push handler - stores incoming tasks from clients.
//!
//! Each task is upserted by id. A stored copy is only replaced when the
//! incoming `updatedAt` is not older, so a stale client cannot roll back a
//! newer edit; re-pushing an unchanged task counts as an update.

use crate::db;
use crate::error::{Context, Result};
use ordo_sync::sync::{resolve, PushError, PushRequest, PushResponse, PushResults, Resolution, SyncRecord};
use sqlx::PgPool;

/// Process a push request from a client.
///
/// Failures on individual tasks are reported in `results.errors` and do not
/// abort the batch.
pub async fn handle_push(pool: &PgPool, request: PushRequest) -> Result<PushResponse> {
    tracing::debug!(task_count = request.tasks.len(), "Processing push");

    let mut results = PushResults::default();
    for task in &request.tasks {
        match push_one(pool, task).await {
            Ok(Resolution::Insert) => results.created += 1,
            Ok(Resolution::TakeRemote) => results.updated += 1,
            Ok(Resolution::KeepLocal) => {
                tracing::debug!(task_id = %task.id, "Skipping task, stored copy is newer")
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "Failed to store task");
                results.errors.push(PushError {
                    task_id: task.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        created = results.created,
        updated = results.updated,
        errors = results.errors.len(),
        "Push completed"
    );

    let synced = results.created + results.updated;
    Ok(PushResponse {
        success: true,
        results: Some(results),
        message: Some(format!("Synced {synced} tasks")),
        error: None,
        details: None,
    })
}

async fn push_one(pool: &PgPool, task: &SyncRecord) -> Result<Resolution> {
    let stored = db::get_task_updated_at(pool, &task.id)
        .await
        .context("Failed to read task")?;

    // The stored copy plays the local side: it survives only if strictly newer.
    let resolution = resolve(
        stored.map(|t| t.timestamp_millis()),
        task.updated_at.timestamp_millis(),
    );
    match resolution {
        Resolution::Insert => db::insert_task(pool, task)
            .await
            .context("Failed to create task")?,
        Resolution::TakeRemote => db::update_task(pool, task)
            .await
            .context("Failed to update task")?,
        Resolution::KeepLocal => {}
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_copy_is_the_local_side() {
        // Same timestamp: an unchanged re-push updates.
        assert_eq!(resolve(Some(1_000), 1_000), Resolution::TakeRemote);
        // Older incoming copy is skipped.
        assert_eq!(resolve(Some(2_000), 1_000), Resolution::KeepLocal);
        assert_eq!(resolve(None, 1_000), Resolution::Insert);
    }
}
