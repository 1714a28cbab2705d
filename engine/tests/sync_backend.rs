//! Sync client and context tests against an in-process fake backend.
//!
//! The fake speaks the same HTTP protocol as the reference server and keeps
//! its tasks in memory.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use ordo_sync::sync::{
    AlwaysOnline, OnlineFlag, PushRequest, PushResponse, PushResults, SyncRecord, SyncTransport,
};
use ordo_sync::{
    AppContext, Boot, Config, NewTask, SyncClient, SyncError, SyncPhase, Task, TaskPatch,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Default)]
struct Backend {
    tasks: Arc<Mutex<HashMap<String, SyncRecord>>>,
}

impl Backend {
    fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    fn get(&self, id: &str) -> Option<SyncRecord> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    fn insert(&self, record: SyncRecord) {
        self.tasks.lock().unwrap().insert(record.id.clone(), record);
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

async fn push(State(backend): State<Backend>, Json(request): Json<PushRequest>) -> Json<PushResponse> {
    let mut tasks = backend.tasks.lock().unwrap();
    let mut results = PushResults::default();

    for record in request.tasks {
        let stored = tasks.get(&record.id).map(|r| r.updated_at);
        match stored {
            None => {
                results.created += 1;
                tasks.insert(record.id.clone(), record);
            }
            Some(stored) if record.updated_at >= stored => {
                results.updated += 1;
                tasks.insert(record.id.clone(), record);
            }
            Some(_) => {}
        }
    }

    let synced = results.created + results.updated;
    Json(PushResponse {
        success: true,
        results: Some(results),
        message: Some(format!("Synced {synced} tasks")),
        error: None,
        details: None,
    })
}

async fn pull(State(backend): State<Backend>) -> Json<serde_json::Value> {
    let tasks: Vec<SyncRecord> = backend.tasks.lock().unwrap().values().cloned().collect();
    Json(json!({ "success": true, "tasks": tasks }))
}

async fn pull_since(State(backend): State<Backend>, Path(since): Path<String>) -> Response {
    let Ok(since) = DateTime::parse_from_rfc3339(&since).map(|d| d.with_timezone(&Utc)) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid timestamp format" })),
        )
            .into_response();
    };
    let tasks: Vec<SyncRecord> = backend
        .tasks
        .lock()
        .unwrap()
        .values()
        .filter(|r| r.updated_at >= since)
        .cloned()
        .collect();
    Json(json!({ "success": true, "tasks": tasks })).into_response()
}

async fn remove(State(backend): State<Backend>, Path(id): Path<String>) -> Response {
    match backend.tasks.lock().unwrap().remove(&id) {
        Some(_) => Json(json!({ "success": true, "message": format!("Task {id} deleted successfully") }))
            .into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Task not found" }))).into_response(),
    }
}

fn router(backend: Backend) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync/tasks", get(pull).post(push))
        .route("/sync/tasks/since/{ts}", get(pull_since))
        .route("/sync/tasks/{id}", delete(remove))
        .with_state(backend)
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn fake_backend() -> (Backend, SyncClient) {
    let backend = Backend::default();
    let url = serve(router(backend.clone())).await;
    (backend, SyncClient::new(url))
}

fn record(id: &str, updated_ms: i64) -> SyncRecord {
    SyncRecord::from_task(&Task {
        id: id.into(),
        title: format!("task {id}"),
        description: Some("from test".into()),
        completed: false,
        created_at: 1_706_745_600_000,
        updated_at: updated_ms,
        due_date: None,
        user_id: None,
    })
    .unwrap()
}

fn test_config(dir: &TempDir, backend_url: &str) -> Config {
    Config {
        data_dir: dir.path().to_path_buf(),
        backend_url: backend_url.to_string(),
        health_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

// ============================================================================
// Sync Client
// ============================================================================

#[tokio::test]
async fn health_probe_reports_online() {
    let (_, client) = fake_backend().await;
    assert!(client.is_online().await);
}

#[tokio::test]
async fn unhealthy_backend_is_offline() {
    let app = Router::new().route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let client = SyncClient::new(serve(app).await);
    assert!(!client.is_online().await);
}

#[tokio::test]
async fn pushing_the_same_record_twice_updates_instead_of_duplicating() {
    let (backend, client) = fake_backend().await;
    let task = record("t-1", 1_706_745_601_000);

    let first = client.push_tasks(&[task.clone()]).await.unwrap();
    assert_eq!((first.created, first.updated), (1, 0));

    let second = client.push_tasks(&[task]).await.unwrap();
    assert_eq!((second.created, second.updated), (0, 1));
    assert!(second.errors.is_empty());
    assert_eq!(backend.len(), 1);
}

#[tokio::test]
async fn pull_and_incremental_pull() {
    let (backend, client) = fake_backend().await;
    backend.insert(record("old", 1_706_745_600_000));
    backend.insert(record("new", 1_706_832_000_000));

    let all = client.pull_tasks().await.unwrap();
    assert_eq!(all.len(), 2);

    let since = DateTime::parse_from_rfc3339("2024-02-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let recent = client.pull_tasks_since(since).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "new");
}

#[tokio::test]
async fn delete_reports_missing_records() {
    let (backend, client) = fake_backend().await;
    backend.insert(record("t-1", 1_706_745_600_000));

    client.delete_task("t-1").await.unwrap();
    assert_eq!(backend.len(), 0);

    let failure = client.delete_task("t-1").await.unwrap_err();
    assert_eq!(failure.kind, SyncError::Rejected);
    assert_eq!(failure.error, "Task not found");
    assert!(failure.is_not_found());
}

#[tokio::test]
async fn server_errors_become_typed_failures() {
    let app = Router::new().route(
        "/sync/tasks",
        get(|| async { (StatusCode::OK, "<html>maintenance</html>") }).post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to sync tasks", "details": "connection reset" })),
            )
        }),
    );
    let client = SyncClient::new(serve(app).await);

    let failure = client.push_tasks(&[record("t-1", 1)]).await.unwrap_err();
    assert_eq!(failure.kind, SyncError::Rejected);
    assert_eq!(failure.error, "Failed to sync tasks");
    assert_eq!(failure.details.as_deref(), Some("connection reset"));
    assert_eq!(failure.status, Some(500));

    let failure = client.pull_tasks().await.unwrap_err();
    assert_eq!(failure.kind, SyncError::Decode);
    assert_eq!(failure.error, "Failed to pull tasks");
}

#[tokio::test]
async fn bidirectional_pushes_then_pulls() {
    let (backend, client) = fake_backend().await;
    backend.insert(record("remote", 1_706_745_600_000));

    let outcome = client
        .sync_bidirectional(&[record("local", 1_706_745_600_000)], None)
        .await;

    assert!(outcome.success());
    assert_eq!(outcome.push.unwrap().created, 1);
    assert_eq!(outcome.pull.unwrap().len(), 2);
}

// ============================================================================
// Application Context
// ============================================================================

#[tokio::test]
async fn local_writes_are_auto_synced() {
    let (backend, client) = fake_backend().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, client.base_url());

    let ctx = AppContext::init_with(config, Arc::new(client), Arc::new(AlwaysOnline))
        .await
        .unwrap();

    let kept = ctx.create_task(NewTask::titled("kept")).await.unwrap();
    let gone = ctx.create_task(NewTask::titled("gone")).await.unwrap();
    ctx.update_task(&kept.id, TaskPatch::completed(true)).await.unwrap();
    ctx.delete_task(&gone.id).await.unwrap();

    let auto_sync_stats = {
        let mut ctx = ctx;
        ctx.auto_sync.shutdown().await;
        let stats = ctx.auto_sync.stats();
        ctx.teardown().await;
        stats
    };

    assert_eq!(auto_sync_stats.pushed, 3);
    assert_eq!(auto_sync_stats.deleted, 1);
    assert_eq!(auto_sync_stats.failed, 0);
    assert_eq!(backend.len(), 1);
    assert!(backend.get(&kept.id).unwrap().completed);
}

#[tokio::test]
async fn local_writes_survive_an_unreachable_backend() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "http://127.0.0.1:9");
    let client = SyncClient::with_timeouts(
        "http://127.0.0.1:9",
        Duration::from_millis(300),
        Duration::from_millis(300),
    );
    let flag = OnlineFlag::new(false);

    let ctx = AppContext::init_with(config, Arc::new(client), Arc::new(flag.clone()))
        .await
        .unwrap();

    let task = ctx.create_task(NewTask::titled("offline")).await.unwrap();
    let failure = ctx.sync.sync_to_cloud(&[task.clone()]).await.unwrap_err();
    assert_eq!(failure.kind, SyncError::Offline);
    assert_eq!(ctx.sync.state().phase, SyncPhase::Error);

    flag.set(true);
    let failure = ctx.sync.sync_to_cloud(&[task.clone()]).await.unwrap_err();
    assert_eq!(failure.kind, SyncError::BackendUnavailable);

    assert_eq!(ctx.tasks.get(&task.id).await.unwrap(), Some(task));
    ctx.teardown().await;
}

#[tokio::test]
async fn sync_and_merge_reconciles_both_sides() {
    let (backend, client) = fake_backend().await;
    let dir = TempDir::new().unwrap();
    let config = Config {
        auto_sync: false,
        ..test_config(&dir, client.base_url())
    };
    let ctx = AppContext::init_with(config, Arc::new(client), Arc::new(AlwaysOnline))
        .await
        .unwrap();

    let local = ctx.tasks.create(NewTask::titled("local")).await.unwrap();
    backend.insert(record("remote", 1_706_745_600_000));

    let report = ctx.sync.sync_and_merge(&ctx.tasks).await.unwrap();
    assert_eq!(report.pushed.created, 1);
    assert_eq!(report.pulled, 2);
    assert_eq!(report.merge.inserted, 1);
    assert!(report.message.starts_with("Successfully synced! Created: 1"));

    let ids: Vec<_> = ctx
        .tasks
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert!(ids.contains(&local.id));
    assert!(ids.contains(&"remote".to_string()));
    assert_eq!(backend.len(), 2);
    assert!(ctx.sync.state().last_sync_time.is_some());

    ctx.teardown().await;
}

#[tokio::test]
async fn merge_after_push_only_sync_still_pulls_older_remote_tasks() {
    let (backend, client) = fake_backend().await;
    let dir = TempDir::new().unwrap();
    let config = Config {
        auto_sync: false,
        ..test_config(&dir, client.base_url())
    };
    let ctx = AppContext::init_with(config, Arc::new(client), Arc::new(AlwaysOnline))
        .await
        .unwrap();

    backend.insert(record("remote", Utc::now().timestamp_millis() - 60_000));

    ctx.sync.sync_to_cloud(&[]).await.unwrap();
    assert_eq!(ctx.sync.state().last_pull_time, None);

    let report = ctx.sync.sync_and_merge(&ctx.tasks).await.unwrap();
    assert_eq!(report.pulled, 1);
    assert_eq!(report.merge.inserted, 1);
    assert!(ctx.tasks.get("remote").await.unwrap().is_some());

    ctx.teardown().await;
}

#[tokio::test]
async fn reopening_reattaches_to_persisted_tasks() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        auto_sync: false,
        ..test_config(&dir, "http://127.0.0.1:9")
    };

    let ctx = AppContext::init(config.clone()).await.unwrap();
    let task = ctx.tasks.create(NewTask::titled("persisted")).await.unwrap();
    ctx.teardown().await;

    let ctx = AppContext::init(config).await.unwrap();
    assert_eq!(ctx.tasks.list().await.unwrap(), vec![task]);
    ctx.teardown().await;
}

#[tokio::test]
async fn unusable_data_dir_boots_degraded() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let config = Config {
        data_dir: file.path().to_path_buf(),
        auto_sync: false,
        ..Config::default()
    };

    match AppContext::boot(config).await {
        Boot::Degraded { error } => assert!(matches!(error, ordo_sync::Error::StoreUnavailable { .. })),
        Boot::Ready(_) => panic!("store should not open under a regular file"),
    }
}
