//! Record service for the `tasks` table.

use super::TaskStats;
use crate::error::{Error, Result};
use crate::record::{new_record_id, next_timestamp, now_millis, NewTask, Task, TaskPatch};
use crate::store::LocalStore;
use crate::sync::merge::{resolve, MergeReport, Resolution};
use crate::Timestamp;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

const TABLE: &str = "tasks";

const COLUMNS: &str = "id, title, description, completed, created_at, updated_at, due_date, user_id";

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    Ok(Task {
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

/// CRUD over tasks.
#[derive(Debug, Clone)]
pub struct TaskService {
    store: LocalStore,
}

impl TaskService {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Insert a new task with a fresh id and both timestamps set to now.
    pub async fn create(&self, new: NewTask) -> Result<Task> {
        let now = now_millis();
        let row = sqlx::query(&format!(
            "INSERT INTO {TABLE} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7) RETURNING {COLUMNS}"
        ))
        .bind(new_record_id())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.completed)
        .bind(now)
        .bind(new.due_date)
        .bind(&new.user_id)
        .fetch_optional(self.store.pool())
        .await?
        .ok_or_else(|| Error::InsertFailed(TABLE.to_string()))?;

        let task = task_from_row(&row)?;
        tracing::info!(task_id = %task.id, title = %task.title, "Task created");
        Ok(task)
    }

    /// Fetch a task by id.
    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.store.pool())
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    /// Apply `patch` to the task, bumping `updated_at`.
    ///
    /// Only the fields set in the patch are written.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut query = QueryBuilder::<Sqlite>::new(format!("UPDATE {TABLE} SET updated_at = "));
        query.push_bind(next_timestamp(current.updated_at));
        if let Some(title) = patch.title {
            query.push(", title = ").push_bind(title);
        }
        if let Some(description) = patch.description {
            query.push(", description = ").push_bind(description);
        }
        if let Some(completed) = patch.completed {
            query.push(", completed = ").push_bind(completed);
        }
        if let Some(due_date) = patch.due_date {
            query.push(", due_date = ").push_bind(due_date);
        }
        if let Some(user_id) = patch.user_id {
            query.push(", user_id = ").push_bind(user_id);
        }
        query.push(" WHERE id = ").push_bind(id.to_string());
        query.push(format!(" RETURNING {COLUMNS}"));

        let row = query
            .build()
            .fetch_optional(self.store.pool())
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let task = task_from_row(&row)?;
        tracing::info!(task_id = %task.id, "Task updated");
        Ok(task)
    }

    /// Mark a task done or not done.
    pub async fn set_completed(&self, id: &str, completed: bool) -> Result<Task> {
        self.update(id, TaskPatch::completed(completed)).await
    }

    /// Delete a task. Deleting an unknown id is not an error.
    ///
    /// Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {TABLE} WHERE id = ?1"))
            .bind(id)
            .execute(self.store.pool())
            .await?;

        let removed = result.rows_affected() > 0;
        tracing::info!(task_id = %id, removed, "Task deleted");
        Ok(removed)
    }

    /// All tasks, oldest first.
    pub async fn list(&self) -> Result<Vec<Task>> {
        self.fetch(&format!(
            "SELECT {COLUMNS} FROM {TABLE} ORDER BY created_at ASC, rowid ASC"
        ))
        .await
    }

    /// Tasks with the given completion flag, oldest first.
    pub async fn list_completed(&self, completed: bool) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM {TABLE} WHERE completed = ?1 ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(completed)
        .fetch_all(self.store.pool())
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// Tasks modified strictly after `since`, least recently updated first.
    pub async fn list_updated_since(&self, since: Timestamp) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM {TABLE} WHERE updated_at > ?1 ORDER BY updated_at ASC, rowid ASC"
        ))
        .bind(since)
        .fetch_all(self.store.pool())
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// Completed/pending counts.
    pub async fn stats(&self) -> Result<TaskStats> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN completed THEN 1 ELSE 0 END), 0) AS completed \
             FROM {TABLE}"
        ))
        .fetch_one(self.store.pool())
        .await?;

        let total: i64 = row.try_get("total")?;
        let completed: i64 = row.try_get("completed")?;
        Ok(TaskStats {
            total,
            completed,
            pending: total - completed,
        })
    }

    /// Delete every task. The table itself stays.
    pub async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {TABLE}"))
            .execute(self.store.pool())
            .await?;

        tracing::info!(removed = result.rows_affected(), "All tasks cleared");
        Ok(result.rows_affected())
    }

    /// Merge records pulled from the cloud, latest `updated_at` winning.
    ///
    /// Absent records are inserted as-is; a strictly newer local row is kept;
    /// otherwise the remote fields overwrite the local ones. Runs in one
    /// transaction.
    pub async fn merge_remote(&self, remote: &[Task]) -> Result<MergeReport> {
        let mut report = MergeReport::default();
        let mut tx = self.store.pool().begin().await?;

        for incoming in remote {
            let local_updated = sqlx::query_scalar::<_, Timestamp>(&format!(
                "SELECT updated_at FROM {TABLE} WHERE id = ?1"
            ))
            .bind(&incoming.id)
            .fetch_optional(&mut *tx)
            .await?;

            match resolve(local_updated, incoming.updated_at) {
                Resolution::Insert => {
                    sqlx::query(&format!(
                        "INSERT INTO {TABLE} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                    ))
                    .bind(&incoming.id)
                    .bind(&incoming.title)
                    .bind(&incoming.description)
                    .bind(incoming.completed)
                    .bind(incoming.created_at)
                    .bind(incoming.updated_at)
                    .bind(incoming.due_date)
                    .bind(&incoming.user_id)
                    .execute(&mut *tx)
                    .await?;
                    report.inserted += 1;
                }
                Resolution::TakeRemote => {
                    sqlx::query(&format!(
                        "UPDATE {TABLE} SET title = ?2, description = ?3, completed = ?4, \
                         updated_at = MAX(updated_at, ?5), due_date = ?6 WHERE id = ?1"
                    ))
                    .bind(&incoming.id)
                    .bind(&incoming.title)
                    .bind(&incoming.description)
                    .bind(incoming.completed)
                    .bind(incoming.updated_at)
                    .bind(incoming.due_date)
                    .execute(&mut *tx)
                    .await?;
                    report.updated += 1;
                }
                Resolution::KeepLocal => {
                    tracing::debug!(task_id = %incoming.id, "Local task is newer, keeping it");
                    report.kept_local += 1;
                }
            }
        }

        tx.commit().await?;
        tracing::info!(
            inserted = report.inserted,
            updated = report.updated,
            kept_local = report.kept_local,
            "Merged remote tasks"
        );
        Ok(report)
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query(sql).fetch_all(self.store.pool()).await?;
        rows.iter().map(task_from_row).collect()
    }
}
