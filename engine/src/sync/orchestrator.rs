//! Sequencing of sync runs and the state the UI observes.
//!
//! The orchestrator is the only writer of [`SyncState`]. Readers take a
//! snapshot with [`SyncOrchestrator::state`] or follow changes through
//! [`SyncOrchestrator::subscribe`].
//!
//! Only one run is in flight at a time: a call made while the phase is
//! [`SyncPhase::Syncing`] fails with [`SyncError::Busy`] and leaves the state
//! alone. There is no wait queue.

use super::client::SyncTransport;
use super::error::{SyncError, SyncFailure, SyncOutcome};
use super::merge::MergeReport;
use super::wire::SyncRecord;
use crate::record::Task;
use crate::service::TaskService;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Source of the device's online flag.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity for hosts without an offline mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// A settable online flag, shared with whatever watches the network.
#[derive(Debug, Clone)]
pub struct OnlineFlag(Arc<AtomicBool>);

impl OnlineFlag {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Default for OnlineFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for OnlineFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

/// Ephemeral status of the current or last sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub phase: SyncPhase,
    /// When the last successful run of any kind finished (push) or started
    /// (pull, merge).
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Start of the last successful pull. Incremental pulls fetch from here;
    /// a push alone never moves it.
    pub last_pull_time: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl SyncState {
    pub fn is_syncing(&self) -> bool {
        self.phase == SyncPhase::Syncing
    }
}

/// Counts from one push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
}

impl SyncStats {
    /// Summary shown after a successful push.
    pub fn message(&self) -> String {
        let mut message = format!(
            "Successfully synced! Created: {}, Updated: {}",
            self.created, self.updated
        );
        if self.errors > 0 {
            message.push_str(&format!(", Errors: {}", self.errors));
        }
        message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub stats: SyncStats,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub tasks: Vec<Task>,
    pub message: String,
}

/// Outcome of a push, pull and local merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSyncReport {
    pub pushed: SyncStats,
    pub pulled: usize,
    pub merge: MergeReport,
    pub message: String,
}

/// Coordinates sync runs against a [`SyncTransport`].
pub struct SyncOrchestrator {
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<dyn Connectivity>,
    state: watch::Sender<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(transport: Arc<dyn SyncTransport>, connectivity: Arc<dyn Connectivity>) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            transport,
            connectivity,
            state,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Whether the backend is reachable. Never fails.
    pub async fn check_backend_status(&self) -> bool {
        self.transport.is_online().await
    }

    /// Push `tasks` to the backend.
    pub async fn sync_to_cloud(&self, tasks: &[Task]) -> SyncOutcome<PushReport> {
        self.begin("Checking connection...")?;
        let result = self.push(tasks).await;
        match result {
            Ok(stats) => {
                let message = stats.message();
                self.succeed(message.clone(), Utc::now(), None);
                tracing::info!(
                    created = stats.created,
                    updated = stats.updated,
                    errors = stats.errors,
                    "Synced tasks to cloud"
                );
                Ok(PushReport { stats, message })
            }
            Err(failure) => Err(self.fail(failure)),
        }
    }

    /// Pull every task the backend holds.
    pub async fn pull_from_cloud(&self) -> SyncOutcome<PullReport> {
        self.pull(None).await
    }

    /// Pull tasks changed since the last successful pull, or all tasks when
    /// there was none.
    pub async fn pull_since_last_sync(&self) -> SyncOutcome<PullReport> {
        let since = self.state.borrow().last_pull_time;
        self.pull(since).await
    }

    /// Push every local task, pull what changed remotely and merge it into
    /// the local store latest-wins.
    pub async fn sync_and_merge(&self, tasks: &TaskService) -> SyncOutcome<MergeSyncReport> {
        self.begin("Syncing with cloud...")?;
        let started_at = Utc::now();
        let since = self.state.borrow().last_pull_time;

        let result = async {
            let local = tasks.list().await.map_err(|e| SyncFailure::store(&e))?;
            let pushed = self.push(&local).await?;

            let records = match since {
                Some(since) => self.transport.pull_tasks_since(since).await?,
                None => self.transport.pull_tasks().await?,
            };
            let pulled = records.len();
            let remote: Vec<Task> = records.into_iter().map(SyncRecord::into_task).collect();
            let merge = tasks
                .merge_remote(&remote)
                .await
                .map_err(|e| SyncFailure::store(&e))?;

            Ok::<_, SyncFailure>((pushed, pulled, merge))
        }
        .await;

        match result {
            Ok((pushed, pulled, merge)) => {
                let message = format!("{}, Pulled: {pulled}", pushed.message());
                // Records changed remotely while this run was in flight are
                // picked up by the next incremental pull.
                self.succeed(message.clone(), started_at, Some(started_at));
                tracing::info!(
                    created = pushed.created,
                    updated = pushed.updated,
                    pulled,
                    merged = merge.applied(),
                    "Bidirectional sync completed"
                );
                Ok(MergeSyncReport {
                    pushed,
                    pulled,
                    merge,
                    message,
                })
            }
            Err(failure) => Err(self.fail(failure)),
        }
    }

    /// Return to idle, keeping `last_sync_time` and `last_pull_time`.
    pub fn clear_sync_status(&self) {
        self.state.send_modify(|state| {
            state.phase = SyncPhase::Idle;
            state.message = None;
            state.error = None;
        });
    }

    /// Forget everything, including both sync times.
    pub fn reset(&self) {
        self.state.send_replace(SyncState::default());
    }

    async fn pull(&self, since: Option<DateTime<Utc>>) -> SyncOutcome<PullReport> {
        self.begin("Pulling tasks from cloud...")?;
        let started_at = Utc::now();

        let result = async {
            self.ensure_reachable().await?;
            match since {
                Some(since) => self.transport.pull_tasks_since(since).await,
                None => self.transport.pull_tasks().await,
            }
        }
        .await;

        match result {
            Ok(records) => {
                let message = format!("Pulled {} tasks from cloud", records.len());
                self.succeed(message.clone(), started_at, Some(started_at));
                tracing::info!(count = records.len(), incremental = since.is_some(), "Pulled tasks");
                let tasks = records.into_iter().map(SyncRecord::into_task).collect();
                Ok(PullReport { tasks, message })
            }
            Err(failure) => Err(self.fail(failure)),
        }
    }

    async fn push(&self, tasks: &[Task]) -> SyncOutcome<SyncStats> {
        self.ensure_reachable().await?;

        let records = tasks
            .iter()
            .map(SyncRecord::from_task)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncFailure::store(&e))?;

        self.set_message(format!("Syncing {} tasks to cloud...", records.len()));
        let results = self.transport.push_tasks(&records).await?;
        for rejected in &results.errors {
            tracing::warn!(task_id = %rejected.task_id, error = %rejected.error, "Backend rejected task");
        }

        Ok(SyncStats {
            created: results.created,
            updated: results.updated,
            errors: results.errors.len(),
        })
    }

    /// Fail fast when the device is offline, then probe the backend.
    async fn ensure_reachable(&self) -> SyncOutcome<()> {
        if !self.connectivity.is_online() {
            return Err(SyncFailure::offline());
        }
        if !self.transport.is_online().await {
            return Err(SyncFailure::backend_unavailable());
        }
        Ok(())
    }

    /// Enter `Syncing`, or fail with `Busy` if already there.
    fn begin(&self, message: &str) -> SyncOutcome<()> {
        let started = self.state.send_if_modified(|state| {
            if state.is_syncing() {
                return false;
            }
            state.phase = SyncPhase::Syncing;
            state.message = Some(message.to_string());
            state.error = None;
            true
        });

        if started {
            Ok(())
        } else {
            tracing::debug!("Sync requested while another is in flight");
            Err(SyncFailure::busy())
        }
    }

    fn set_message(&self, message: String) {
        self.state.send_modify(|state| state.message = Some(message));
    }

    fn succeed(&self, message: String, at: DateTime<Utc>, pulled_from: Option<DateTime<Utc>>) {
        self.state.send_modify(|state| {
            state.phase = SyncPhase::Success;
            state.message = Some(message);
            state.error = None;
            state.last_sync_time = Some(at);
            if pulled_from.is_some() {
                state.last_pull_time = pulled_from;
            }
        });
    }

    fn fail(&self, failure: SyncFailure) -> SyncFailure {
        match failure.kind {
            SyncError::Offline | SyncError::BackendUnavailable => {
                tracing::info!(reason = %failure, "Sync skipped")
            }
            _ => tracing::warn!(
                kind = ?failure.kind,
                error = %failure.error,
                details = failure.details.as_deref().unwrap_or_default(),
                "Sync failed"
            ),
        }
        self.state.send_modify(|state| {
            state.phase = SyncPhase::Error;
            state.message = None;
            state.error = Some(failure.error.clone());
        });
        failure
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
