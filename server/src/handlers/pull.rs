//! Pull handler - serves stored tasks to clients.

use crate::db;
use crate::error::{AppError, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use ordo_sync::sync::{PullResponse, SyncRecord};
use sqlx::PgPool;

/// Return every stored task.
pub async fn handle_pull(pool: &PgPool) -> Result<PullResponse> {
    let tasks = db::list_tasks(pool).await.context("Failed to fetch tasks")?;
    tracing::debug!(count = tasks.len(), "Serving full pull");

    Ok(PullResponse {
        success: true,
        tasks: tasks.into_iter().map(SyncRecord::from).collect(),
        since: None,
        error: None,
        details: None,
    })
}

/// Return tasks updated at or after `raw_since`.
pub async fn handle_pull_since(pool: &PgPool, raw_since: String) -> Result<PullResponse> {
    let since = parse_since(&raw_since).ok_or_else(|| AppError::bad_request("Invalid timestamp format"))?;

    let tasks = db::list_tasks_since(pool, since)
        .await
        .context("Failed to fetch recent tasks")?;
    tracing::debug!(count = tasks.len(), %since, "Serving incremental pull");

    Ok(PullResponse {
        success: true,
        tasks: tasks.into_iter().map(SyncRecord::from).collect(),
        since: Some(raw_since),
        error: None,
        details: None,
    })
}

/// Accepts RFC 3339 or milliseconds since the epoch.
pub fn parse_since(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}
