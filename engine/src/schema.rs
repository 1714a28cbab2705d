//! Schema definitions and the startup guardian that enforces them.
//!
//! Each managed table is described by a [`TableSchema`]. Before any record
//! service touches a table, [`prepare`] checks the live columns against the
//! descriptor and either creates the table, leaves it alone, or drops and
//! recreates it. There is no column-level migration: drift means reset.

use crate::error::{Error, Result};
use crate::store::LocalStore;
use std::fmt;

/// Column storage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Bool,
    /// Milliseconds since the Unix epoch.
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Integer | ColumnType::Timestamp => write!(f, "INTEGER"),
            ColumnType::Real => write!(f, "REAL"),
            ColumnType::Bool => write!(f, "BOOLEAN"),
        }
    }
}

/// Definition of a column in a managed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<&'static str>,
}

impl ColumnDef {
    /// A `NOT NULL` column.
    pub const fn required(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            primary_key: false,
            default: None,
        }
    }

    /// A nullable column.
    pub const fn optional(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: true,
            primary_key: false,
            default: None,
        }
    }

    /// The text primary key.
    pub const fn primary_key(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Text,
            nullable: false,
            primary_key: true,
            default: None,
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    fn ddl(&self) -> String {
        let mut ddl = format!("{} {}", self.name, self.column_type);
        if self.primary_key {
            ddl.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            ddl.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(default);
        }
        ddl
    }
}

/// Expected shape of one managed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
    /// Columns that get a secondary index.
    pub indexes: Vec<&'static str>,
}

impl TableSchema {
    pub fn new(name: &'static str, columns: Vec<ColumnDef>) -> Self {
        Self {
            name,
            columns,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, column: &'static str) -> Self {
        self.indexes.push(column);
        self
    }

    /// The column names the live table must contain.
    pub fn required_columns(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Canonical DDL: the table plus its indexes.
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnDef::ddl).collect();
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            columns.join(",\n    ")
        );
        for column in &self.indexes {
            sql.push_str(&format!(
                "\nCREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column});",
                table = self.name,
            ));
        }
        sql
    }

    /// Columns of this schema missing from `live`.
    pub fn missing_from(&self, live: &[String]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !live.iter().any(|l| l == c.name))
            .map(|c| c.name.to_string())
            .collect()
    }
}

/// The `tasks` table: the entity pushed to and pulled from the cloud.
pub fn tasks_table() -> TableSchema {
    TableSchema::new(
        "tasks",
        vec![
            ColumnDef::primary_key("id"),
            ColumnDef::required("title", ColumnType::Text),
            ColumnDef::optional("description", ColumnType::Text),
            ColumnDef::required("completed", ColumnType::Bool).with_default("FALSE"),
            ColumnDef::required("created_at", ColumnType::Timestamp),
            ColumnDef::required("updated_at", ColumnType::Timestamp),
            ColumnDef::optional("due_date", ColumnType::Timestamp),
            ColumnDef::optional("user_id", ColumnType::Text),
        ],
    )
    .with_index("completed")
    .with_index("due_date")
}

/// The `todos` table: a local-only list with a numeric field for analytics.
pub fn todos_table() -> TableSchema {
    TableSchema::new(
        "todos",
        vec![
            ColumnDef::primary_key("id"),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("number", ColumnType::Integer),
            ColumnDef::required("created_at", ColumnType::Timestamp),
            ColumnDef::required("updated_at", ColumnType::Timestamp),
        ],
    )
}

/// Every table the record services manage.
pub fn managed_tables() -> Vec<TableSchema> {
    vec![tasks_table(), todos_table()]
}

/// Whether `table` is absent or lacks any of `required_columns`.
///
/// A failing probe counts as "needs migration".
pub async fn needs_migration(store: &LocalStore, table: &str, required_columns: &[&str]) -> bool {
    match store.table_columns(table).await {
        Ok(live) if live.is_empty() => true,
        Ok(live) => required_columns
            .iter()
            .any(|required| !live.iter().any(|l| l == required)),
        Err(e) => {
            tracing::warn!(table = %table, error = %e, "Schema probe failed, assuming migration needed");
            true
        }
    }
}

/// Drop `table` if present and recreate it from `create_sql`. All rows are lost.
pub async fn reset(store: &LocalStore, table: &str, create_sql: &str) -> Result<()> {
    store.exec(&format!("DROP TABLE IF EXISTS {table};")).await?;
    store.exec(create_sql).await?;
    tracing::debug!(table = %table, "Table recreated from canonical schema");
    Ok(())
}

/// Create `table` from `create_sql` only if it does not exist yet. Existing
/// rows are never touched.
pub async fn ensure_exists(store: &LocalStore, table: &str, create_sql: &str) -> Result<()> {
    store.exec(create_sql).await?;
    tracing::debug!(table = %table, "Table ensured");
    Ok(())
}

/// Compare the live table against `schema`.
///
/// Returns [`Error::SchemaMismatch`] naming the missing columns.
pub async fn verify(store: &LocalStore, schema: &TableSchema) -> Result<()> {
    let live = store.table_columns(schema.name).await?;
    let missing = schema.missing_from(&live);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::SchemaMismatch {
            table: schema.name.to_string(),
            missing,
        })
    }
}

/// What [`prepare`] had to do to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The table did not exist and was created.
    Created,
    /// The table existed with drifted columns and was reset.
    Healed { missing: Vec<String> },
    /// The table already matched.
    Ready,
}

/// Bring `schema`'s table to the expected shape.
///
/// Runs the migration check first; a reset and the plain ensure-exists path
/// are exclusive branches.
pub async fn prepare(store: &LocalStore, schema: &TableSchema) -> Result<PrepareOutcome> {
    let required = schema.required_columns();
    let create_sql = schema.create_sql();

    if !needs_migration(store, schema.name, &required).await {
        ensure_exists(store, schema.name, &create_sql).await?;
        tracing::debug!(table = schema.name, "Schema up to date");
        return Ok(PrepareOutcome::Ready);
    }

    if !store.table_exists(schema.name).await.unwrap_or(true) {
        reset(store, schema.name, &create_sql).await?;
        tracing::info!(table = schema.name, "Table created");
        return Ok(PrepareOutcome::Created);
    }

    let missing = match verify(store, schema).await {
        Err(Error::SchemaMismatch { missing, .. }) => missing,
        // The probe failed or saw nothing wrong; the reset still runs.
        _ => Vec::new(),
    };
    tracing::warn!(table = schema.name, missing = ?missing, "Schema mismatch, resetting table");
    reset(store, schema.name, &create_sql).await?;

    Ok(PrepareOutcome::Healed { missing })
}

/// Run [`prepare`] for every managed table.
pub async fn prepare_all(store: &LocalStore) -> Result<Vec<(&'static str, PrepareOutcome)>> {
    let mut outcomes = Vec::new();
    for table in managed_tables() {
        let outcome = prepare(store, &table).await?;
        outcomes.push((table.name, outcome));
    }
    Ok(outcomes)
}
