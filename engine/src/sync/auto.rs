//! Background push of individual local writes.
//!
//! Local mutations enqueue a job and return at once; a single worker drains
//! the queue against the backend. Failures are logged and counted, never
//! reported back to the write that caused them.

use super::client::SyncTransport;
use super::wire::SyncRecord;
use crate::record::Task;
use crate::RecordId;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// One unit of background sync work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSyncJob {
    /// Push a created or updated task.
    Upsert(Task),
    /// Remove a task from the backend.
    Delete(RecordId),
}

/// What happened to an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Enqueued,
    /// Auto-sync is turned off; nothing was queued.
    Disabled,
    /// The queue was full or the worker has stopped.
    Dropped,
}

#[derive(Debug, Default)]
struct Counters {
    pushed: AtomicU64,
    deleted: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the worker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSyncStats {
    pub pushed: u64,
    pub deleted: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Handle to the auto-sync queue and its worker.
#[derive(Debug)]
pub struct AutoSync {
    sender: Option<mpsc::Sender<AutoSyncJob>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl AutoSync {
    /// Start the worker. Must be called from within a Tokio runtime.
    pub fn spawn(transport: Arc<dyn SyncTransport>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(transport, receiver, counters.clone()));

        tracing::debug!(capacity, "Auto-sync worker started");
        Self {
            sender: Some(sender),
            worker: Some(worker),
            counters,
        }
    }

    /// A handle that accepts nothing.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            worker: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn auto_sync_task(&self, task: &Task) -> Enqueue {
        self.enqueue(AutoSyncJob::Upsert(task.clone()))
    }

    pub fn auto_delete_task(&self, id: &str) -> Enqueue {
        self.enqueue(AutoSyncJob::Delete(id.to_string()))
    }

    pub fn enqueue(&self, job: AutoSyncJob) -> Enqueue {
        let Some(sender) = &self.sender else {
            return Enqueue::Disabled;
        };

        match sender.try_send(job) {
            Ok(()) => Enqueue::Enqueued,
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(job = ?job, "Auto-sync queue full, dropping job");
                Enqueue::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Auto-sync worker stopped, dropping job");
                Enqueue::Dropped
            }
        }
    }

    pub fn stats(&self) -> AutoSyncStats {
        AutoSyncStats {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            deleted: self.counters.deleted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait for the worker to finish what is queued.
    pub async fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "Auto-sync worker panicked");
            }
        }
    }
}

async fn run_worker(
    transport: Arc<dyn SyncTransport>,
    mut receiver: mpsc::Receiver<AutoSyncJob>,
    counters: Arc<Counters>,
) {
    while let Some(job) = receiver.recv().await {
        match job {
            AutoSyncJob::Upsert(task) => {
                let record = match SyncRecord::from_task(&task) {
                    Ok(record) => record,
                    Err(err) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(task_id = %task.id, error = %err, "Cannot encode task for sync");
                        continue;
                    }
                };

                match transport.push_tasks(&[record]).await {
                    Ok(_) => {
                        counters.pushed.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(task_id = %task.id, title = %task.title, "Auto-synced task");
                    }
                    Err(failure) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            task_id = %task.id,
                            error = %failure.error,
                            details = failure.details.as_deref().unwrap_or_default(),
                            "Auto-sync of task failed"
                        );
                    }
                }
            }
            AutoSyncJob::Delete(id) => match transport.delete_task(&id).await {
                Ok(()) => {
                    counters.deleted.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(task_id = %id, "Auto-deleted task from cloud");
                }
                Err(failure) if failure.is_not_found() => {
                    counters.deleted.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(task_id = %id, "Task already absent from cloud");
                }
                Err(failure) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(task_id = %id, error = %failure.error, "Auto-delete of task failed");
                }
            },
        }
    }

    tracing::debug!("Auto-sync worker stopped");
}
