//! Database operations for the tasks table.

use chrono::{DateTime, Utc};
use ordo_sync::sync::SyncRecord;
use sqlx::{PgPool, Row};

const COLUMNS: &str = "id, title, description, completed, created_at, updated_at, due_date, user_id";

/// A stored task row from the database.
#[derive(Debug)]
pub struct StoredTask {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredTask {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredTask {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            completed: row.try_get("completed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            due_date: row.try_get("due_date")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

impl From<StoredTask> for SyncRecord {
    fn from(task: StoredTask) -> Self {
        SyncRecord {
            id: task.id,
            title: task.title,
            description: task.description,
            completed: task.completed,
            created_at: task.created_at,
            updated_at: task.updated_at,
            due_date: task.due_date,
            user_id: task.user_id,
        }
    }
}

/// `updated_at` of a stored task, if it exists.
pub async fn get_task_updated_at(pool: &PgPool, id: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar("SELECT updated_at FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Insert a new task.
pub async fn insert_task(pool: &PgPool, task: &SyncRecord) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO tasks ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.completed)
    .bind(task.created_at)
    .bind(task.updated_at)
    .bind(task.due_date)
    .bind(&task.user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the mutable fields of an existing task.
pub async fn update_task(pool: &PgPool, task: &SyncRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE tasks SET
            title = $2,
            description = $3,
            completed = $4,
            updated_at = $5,
            due_date = $6,
            user_id = COALESCE($7, user_id)
        WHERE id = $1
        "#,
    )
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.completed)
    .bind(task.updated_at)
    .bind(task.due_date)
    .bind(&task.user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// All tasks, oldest first.
pub async fn list_tasks(pool: &PgPool) -> Result<Vec<StoredTask>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM tasks ORDER BY created_at ASC, id ASC"
    ))
    .fetch_all(pool)
    .await
}

/// Tasks updated at or after `since`.
pub async fn list_tasks_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<StoredTask>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM tasks WHERE updated_at >= $1 ORDER BY updated_at ASC, id ASC"
    ))
    .bind(since)
    .fetch_all(pool)
    .await
}

/// Delete a task, returning the removed row.
pub async fn delete_task(pool: &PgPool, id: &str) -> Result<Option<StoredTask>, sqlx::Error> {
    sqlx::query_as(&format!("DELETE FROM tasks WHERE id = $1 RETURNING {COLUMNS}"))
        .bind(id)
        .fetch_optional(pool)
        .await
}
