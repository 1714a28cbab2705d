//! Local store - the embedded SQL database everything else builds on.
//!
//! The store is addressed by a stable logical name so that repeated launches
//! reattach to the same persisted data. Concurrent openers (another process on
//! the same data directory) are serialised by SQLite's own locking: WAL mode
//! plus a busy timeout makes writers queue instead of failing or corrupting.

use crate::error::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum pooled connections for file-backed stores.
const MAX_CONNECTIONS: u32 = 5;

/// Where the store's data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Persisted under `dir` as `<name>.sqlite3`.
    Named { dir: PathBuf, name: String },
    /// Process-local, discarded on close. Used by tests.
    Memory,
}

impl StoreLocation {
    pub fn named(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        StoreLocation::Named {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Logical name of the store.
    pub fn name(&self) -> &str {
        match self {
            StoreLocation::Named { name, .. } => name,
            StoreLocation::Memory => ":memory:",
        }
    }

    /// Path of the database file, if persisted.
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            StoreLocation::Named { dir, name } => Some(dir.join(format!("{name}.sqlite3"))),
            StoreLocation::Memory => None,
        }
    }
}

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    Null,
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Real(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Param::Null)
    }
}

/// Handle to the embedded database. Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    name: Arc<str>,
}

impl LocalStore {
    /// Open (or create) the store at `location`.
    ///
    /// Reopening an existing named store reattaches to its data. Any failure
    /// to bring the backend up is reported as [`Error::StoreUnavailable`].
    pub async fn open(location: StoreLocation) -> Result<Self> {
        let name = location.name().to_string();

        let (options, pool_options) = match &location {
            StoreLocation::Named { dir, .. } => {
                std::fs::create_dir_all(dir).map_err(|e| Error::unavailable(&name, e))?;
                let path = location
                    .path()
                    .ok_or_else(|| Error::unavailable(&name, "no path for named store"))?;
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(BUSY_TIMEOUT);
                (options, SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS))
            }
            StoreLocation::Memory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")
                    .map_err(|e| Error::unavailable(&name, e))?;
                // Every connection to :memory: is its own database, so pin one forever.
                let pool_options = SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None);
                (options, pool_options)
            }
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::unavailable(&name, e))?;

        // Catches files that exist but are not (or no longer) a database.
        sqlx::query("SELECT count(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await
            .map_err(|e| Error::unavailable(&name, e))?;

        tracing::info!(store = %name, "Local store opened");

        Ok(Self {
            pool,
            name: name.into(),
        })
    }

    /// Open an in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(StoreLocation::Memory).await
    }

    /// Logical name the store was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a parameterised statement and return its rows.
    ///
    /// Parameters are bound positionally (`?1`, `?2`, ...); they are never
    /// spliced into the SQL text.
    pub async fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<SqliteRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Text(v) => query.bind(v.as_str()),
                Param::Int(v) => query.bind(*v),
                Param::Real(v) => query.bind(*v),
                Param::Bool(v) => query.bind(*v),
                Param::Null => query.bind(None::<String>),
            };
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Execute raw SQL (DDL or a batch) without a typed result.
    pub async fn exec(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Column names of `table`, in declaration order. Empty if the table is absent.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Error::from))
            .collect()
    }

    /// Whether `table` exists.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<bool, _>(0)?)
    }

    /// Close every pooled connection. Further calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(store = %self.name, "Local store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn query_binds_parameters() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .exec("CREATE TABLE notes (id TEXT PRIMARY KEY, body TEXT, pinned INTEGER)")
            .await
            .unwrap();

        store
            .query(
                "INSERT INTO notes (id, body, pinned) VALUES (?1, ?2, ?3)",
                &["n1".into(), "x'); DROP TABLE notes; --".into(), true.into()],
            )
            .await
            .unwrap();

        let rows = store
            .query("SELECT body, pinned FROM notes WHERE id = ?1", &["n1".into()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get::<String, _>("body"),
            "x'); DROP TABLE notes; --"
        );
        assert!(rows[0].get::<bool, _>("pinned"));
    }

    #[tokio::test]
    async fn null_param_binds_null() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store.exec("CREATE TABLE t (v TEXT)").await.unwrap();
        store
            .query("INSERT INTO t (v) VALUES (?1)", &[Param::from(None::<String>)])
            .await
            .unwrap();

        let rows = store.query("SELECT v FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get::<Option<String>, _>("v"), None);
    }

    #[tokio::test]
    async fn table_columns_and_existence() {
        let store = LocalStore::open_in_memory().await.unwrap();
        assert!(!store.table_exists("things").await.unwrap());
        assert!(store.table_columns("things").await.unwrap().is_empty());

        store
            .exec("CREATE TABLE things (id TEXT PRIMARY KEY, label TEXT)")
            .await
            .unwrap();

        assert!(store.table_exists("things").await.unwrap());
        assert_eq!(store.table_columns("things").await.unwrap(), vec!["id", "label"]);
    }

    #[tokio::test]
    async fn reopen_named_store_keeps_data() {
        let dir = TempDir::new().unwrap();
        let location = StoreLocation::named(dir.path(), "ordo-db");

        let store = LocalStore::open(location.clone()).await.unwrap();
        store.exec("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)").await.unwrap();
        store
            .query("INSERT INTO kv (k, v) VALUES (?1, ?2)", &["a".into(), "1".into()])
            .await
            .unwrap();
        store.close().await;

        let reopened = LocalStore::open(location.clone()).await.unwrap();
        let rows = reopened.query("SELECT v FROM kv", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("v"), "1");
        assert_eq!(reopened.name(), "ordo-db");
        assert!(location.path().unwrap().exists());
    }

    #[tokio::test]
    async fn corrupted_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let location = StoreLocation::named(dir.path(), "broken");
        std::fs::write(location.path().unwrap(), b"definitely not a sqlite file at all").unwrap();

        let err = LocalStore::open(location).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { ref name, .. } if name == "broken"));
    }
}
