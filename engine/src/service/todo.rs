//! Record service for the `todos` table.

use super::Aggregate;
use crate::error::{Error, Result};
use crate::record::{new_record_id, next_timestamp, now_millis, NewTodo, Todo, TodoPatch};
use crate::store::LocalStore;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

const TABLE: &str = "todos";

const COLUMNS: &str = "id, name, number, created_at, updated_at";

/// Default page size for [`TodoService::top`].
pub const DEFAULT_TOP_LIMIT: i64 = 5;

fn todo_from_row(row: &SqliteRow) -> Result<Todo> {
    Ok(Todo {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        number: row.try_get("number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// CRUD and analytics over todos.
#[derive(Debug, Clone)]
pub struct TodoService {
    store: LocalStore,
}

impl TodoService {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewTodo) -> Result<Todo> {
        let now = now_millis();
        let row = sqlx::query(&format!(
            "INSERT INTO {TABLE} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?4) RETURNING {COLUMNS}"
        ))
        .bind(new_record_id())
        .bind(&new.name)
        .bind(new.number)
        .bind(now)
        .fetch_optional(self.store.pool())
        .await?
        .ok_or_else(|| Error::InsertFailed(TABLE.to_string()))?;

        let todo = todo_from_row(&row)?;
        tracing::info!(todo_id = %todo.id, name = %todo.name, "Todo created");
        Ok(todo)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Todo>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.store.pool())
            .await?;

        row.as_ref().map(todo_from_row).transpose()
    }

    /// Apply `patch`, writing only the fields it sets.
    pub async fn update(&self, id: &str, patch: TodoPatch) -> Result<Todo> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut query = QueryBuilder::<Sqlite>::new(format!("UPDATE {TABLE} SET updated_at = "));
        query.push_bind(next_timestamp(current.updated_at));
        if let Some(name) = patch.name {
            query.push(", name = ").push_bind(name);
        }
        if let Some(number) = patch.number {
            query.push(", number = ").push_bind(number);
        }
        query.push(" WHERE id = ").push_bind(id.to_string());
        query.push(format!(" RETURNING {COLUMNS}"));

        let row = query
            .build()
            .fetch_optional(self.store.pool())
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let todo = todo_from_row(&row)?;
        tracing::info!(todo_id = %todo.id, "Todo updated");
        Ok(todo)
    }

    /// Delete a todo; unknown ids are ignored.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {TABLE} WHERE id = ?1"))
            .bind(id)
            .execute(self.store.pool())
            .await?;

        tracing::info!(todo_id = %id, "Todo deleted");
        Ok(result.rows_affected() > 0)
    }

    /// All todos, oldest first.
    pub async fn list(&self) -> Result<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM {TABLE} ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(self.store.pool())
        .await?;

        rows.iter().map(todo_from_row).collect()
    }

    /// The `limit` todos with the highest `number`.
    pub async fn top(&self, limit: i64) -> Result<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM {TABLE} ORDER BY number DESC, created_at ASC LIMIT ?1"
        ))
        .bind(limit.max(0))
        .fetch_all(self.store.pool())
        .await?;

        rows.iter().map(todo_from_row).collect()
    }

    /// Count and average of `number`.
    pub async fn aggregate(&self) -> Result<Aggregate> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count, COALESCE(AVG(number), 0.0) AS average FROM {TABLE}"
        ))
        .fetch_one(self.store.pool())
        .await?;

        Ok(Aggregate::new(row.try_get("count")?, row.try_get("average")?))
    }

    /// Delete every todo, keeping the table.
    pub async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {TABLE}"))
            .execute(self.store.pool())
            .await?;

        tracing::info!(removed = result.rows_affected(), "All todos cleared");
        Ok(result.rows_affected())
    }
}
