//! JSON bodies of the sync HTTP protocol.
//!
//! Shared with the reference backend so both sides agree on field names and
//! timestamp encoding (ISO-8601 strings on the wire, milliseconds locally).

use crate::record::{to_datetime, Task};
use crate::{error::Result, RecordId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub id: RecordId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl SyncRecord {
    /// Convert a local task, failing on timestamps chrono cannot represent.
    pub fn from_task(task: &Task) -> Result<Self> {
        Ok(Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            completed: task.completed,
            created_at: to_datetime(task.created_at)?,
            updated_at: to_datetime(task.updated_at)?,
            due_date: task.due_date.map(to_datetime).transpose()?,
            user_id: task.user_id.clone(),
        })
    }

    pub fn into_task(self) -> Task {
        Task {
            id: self.id,
            title: self.title,
            description: self.description,
            completed: self.completed,
            created_at: self.created_at.timestamp_millis(),
            updated_at: self.updated_at.timestamp_millis(),
            due_date: self.due_date.map(|d| d.timestamp_millis()),
            user_id: self.user_id,
        }
    }
}

/// Body of `POST /sync/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub tasks: Vec<SyncRecord>,
}

/// A record the backend could not store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushError {
    pub task_id: RecordId,
    pub error: String,
}

/// Per-batch counts reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResults {
    pub created: usize,
    pub updated: usize,
    #[serde(default)]
    pub errors: Vec<PushError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<PushResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body of `GET /sync/tasks` and `GET /sync/tasks/since/{ts}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub tasks: Vec<SyncRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body of `DELETE /sync/tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn task(updated_at: i64, due_date: Option<i64>) -> Task {
        Task {
            id: "t-1".into(),
            title: "Write".into(),
            description: None,
            completed: true,
            created_at: 1_706_745_600_000,
            updated_at,
            due_date,
            user_id: None,
        }
    }

    #[test]
    fn record_wire_shape() {
        let record = SyncRecord::from_task(&task(1_706_745_600_500, None)).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["createdAt"], "2024-02-01T00:00:00Z");
        assert_eq!(json["updatedAt"], "2024-02-01T00:00:00.500Z");
        assert!(json["dueDate"].is_null());
        assert!(json["description"].is_null());
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn decodes_backend_rows() {
        let json = r#"{
            "id": "t-9",
            "title": "From cloud",
            "description": "d",
            "completed": false,
            "createdAt": "2024-02-01T00:00:00.000Z",
            "updatedAt": "2024-02-01T00:00:01.000Z",
            "dueDate": null
        }"#;
        let task = serde_json::from_str::<SyncRecord>(json).unwrap().into_task();

        assert_eq!(task.created_at, 1_706_745_600_000);
        assert_eq!(task.updated_at, 1_706_745_601_000);
        assert_eq!(task.due_date, None);
        assert_eq!(task.user_id, None);
    }

    #[test]
    fn error_bodies_without_success_decode_as_failures() {
        let push: PushResponse =
            serde_json::from_str(r#"{"error":"Failed to sync tasks","details":"x"}"#).unwrap();
        assert!(!push.success);
        assert_eq!(push.error.as_deref(), Some("Failed to sync tasks"));

        let pull: PullResponse = serde_json::from_str(r#"{"error":"nope"}"#).unwrap();
        assert!(!pull.success);
        assert!(pull.tasks.is_empty());
    }

    proptest! {
        #[test]
        fn millisecond_timestamps_survive_the_wire(
            updated in 0i64..4_000_000_000_000,
            due in proptest::option::of(0i64..4_000_000_000_000),
        ) {
            let original = task(updated, due);
            let record = SyncRecord::from_task(&original).unwrap();
            let json = serde_json::to_string(&record).unwrap();
            let back: SyncRecord = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back.into_task(), original);
        }
    }
}
