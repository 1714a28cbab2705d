//! Error types for the local store, schema guardian and record services.

use thiserror::Error;

/// All errors raised by local (non-network) operations.
#[derive(Debug, Error)]
pub enum Error {
    // Startup errors
    #[error("local store '{name}' unavailable: {reason}")]
    StoreUnavailable { name: String, reason: String },

    #[error("table '{table}' is missing columns: {}", missing.join(", "))]
    SchemaMismatch { table: String, missing: Vec<String> },

    // Record errors
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("insert into '{0}' returned no row")]
    InsertFailed(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn unavailable(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::StoreUnavailable {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for local operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::NotFound("task-1".into());
        assert_eq!(err.to_string(), "record not found: task-1");

        let err = Error::SchemaMismatch {
            table: "tasks".into(),
            missing: vec!["updated_at".into(), "due_date".into()],
        };
        assert_eq!(
            err.to_string(),
            "table 'tasks' is missing columns: updated_at, due_date"
        );

        let err = Error::unavailable("ordo-db", "quota exceeded");
        assert_eq!(
            err.to_string(),
            "local store 'ordo-db' unavailable: quota exceeded"
        );

        let err = Error::InsertFailed("todos".into());
        assert_eq!(err.to_string(), "insert into 'todos' returned no row");
    }
}
