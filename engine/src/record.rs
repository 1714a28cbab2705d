//! Record types stored in the local database.

use crate::{error::Error, error::Result, RecordId, Timestamp, UserId};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Timestamp for a mutation of a row last touched at `previous`.
///
/// Always strictly greater than `previous`, even when the wall clock has not
/// advanced (or went backwards) since.
pub fn next_timestamp(previous: Timestamp) -> Timestamp {
    now_millis().max(previous + 1)
}

/// Convert stored milliseconds to a UTC datetime.
pub fn to_datetime(ts: Timestamp) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts)
        .single()
        .ok_or_else(|| Error::InvalidTimestamp(ts.to_string()))
}

/// Generate a fresh record id.
pub fn new_record_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// A task. The entity that is synced with the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Client-generated id, also the sync idempotency key
    pub id: RecordId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    /// Set once at creation (milliseconds since epoch)
    pub created_at: Timestamp,
    /// Bumped on every mutation; the latest-wins tiebreaker
    pub updated_at: Timestamp,
    pub due_date: Option<Timestamp>,
    /// Owner, absent in local-only mode
    pub user_id: Option<UserId>,
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub due_date: Option<Timestamp>,
    pub user_id: Option<UserId>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: Timestamp) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// A partial task update. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<Timestamp>>,
    pub user_id: Option<Option<UserId>>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this patch to `task` in memory.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(user_id) = &self.user_id {
            task.user_id = user_id.clone();
        }
    }
}

/// A todo with a numeric value, used for local analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: RecordId,
    pub name: String,
    pub number: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields for creating a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub name: String,
    pub number: i64,
}

impl NewTodo {
    pub fn new(name: impl Into<String>, number: i64) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }
}

/// A partial todo update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    pub name: Option<String>,
    pub number: Option<i64>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: "task-1".into(),
            title: "A".into(),
            description: Some("B".into()),
            completed: false,
            created_at: 1000,
            updated_at: 1000,
            due_date: Some(5000),
            user_id: None,
        }
    }

    #[test]
    fn next_timestamp_is_strictly_greater() {
        let future = now_millis() + 60_000;
        assert_eq!(next_timestamp(future), future + 1);
        assert!(next_timestamp(0) > 0);
    }

    #[test]
    fn patch_leaves_unset_fields() {
        let mut task = sample_task();
        TaskPatch::title("C").apply_to(&mut task);

        assert_eq!(task.title, "C");
        assert_eq!(task.description.as_deref(), Some("B"));
        assert_eq!(task.due_date, Some(5000));
    }

    #[test]
    fn patch_can_clear_nullable_fields() {
        let mut task = sample_task();
        let patch = TaskPatch {
            description: Some(None),
            due_date: Some(None),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);

        assert_eq!(task.description, None);
        assert_eq!(task.due_date, None);
        assert_eq!(task.title, "A");
    }

    #[test]
    fn empty_patches() {
        assert!(TaskPatch::default().is_empty());
        assert!(!TaskPatch::completed(true).is_empty());
        assert!(TodoPatch::default().is_empty());
    }

    #[test]
    fn record_ids_are_unique_uuids() {
        let a = new_record_id();
        let b = new_record_id();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn datetime_conversion() {
        let dt = to_datetime(1_706_745_600_000).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn task_serializes_camel_case() {
        let json = serde_json::to_value(sample_task()).unwrap();
        assert_eq!(json["createdAt"], 1000);
        assert_eq!(json["dueDate"], 5000);
        assert!(json["userId"].is_null());
    }
}
