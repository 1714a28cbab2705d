//! Application context: the single owner of the store and everything built
//! on it.
//!
//! Build one with [`AppContext::init`] (or [`AppContext::boot`] to get a
//! degraded state instead of an error) at startup and pass it to whatever
//! needs the services. [`AppContext::teardown`] drains the auto-sync queue and
//! closes the store.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::{NewTask, Task, TaskPatch};
use crate::schema::{prepare_all, PrepareOutcome};
use crate::service::{TaskService, TodoService};
use crate::store::LocalStore;
use crate::sync::{
    AlwaysOnline, AutoSync, Connectivity, SyncClient, SyncOrchestrator, SyncTransport,
};
use crate::watchdog::UpdateWatchdog;
use std::sync::Arc;

/// Result of starting up.
#[derive(Debug)]
pub enum Boot {
    Ready(Box<AppContext>),
    /// Local functionality is unavailable; render an error state.
    Degraded { error: Error },
}

#[derive(Debug)]
pub struct AppContext {
    pub config: Config,
    pub store: LocalStore,
    pub tasks: TaskService,
    pub todos: TodoService,
    pub sync: Arc<SyncOrchestrator>,
    pub auto_sync: AutoSync,
    pub watchdog: UpdateWatchdog,
}

impl AppContext {
    /// Open the store, prepare every managed table and wire up sync against
    /// the configured backend.
    pub async fn init(config: Config) -> Result<Self> {
        let transport = Arc::new(SyncClient::with_timeouts(
            config.backend_url.clone(),
            config.health_timeout,
            config.request_timeout,
        ));
        Self::init_with(config, transport, Arc::new(AlwaysOnline)).await
    }

    /// [`AppContext::init`] with an explicit transport and connectivity source.
    pub async fn init_with(
        config: Config,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self> {
        let store = LocalStore::open(config.store_location()).await?;

        for (table, outcome) in prepare_all(&store).await? {
            match outcome {
                PrepareOutcome::Healed { missing } => {
                    tracing::warn!(table, missing = ?missing, "Schema drift healed, local rows were reset")
                }
                other => tracing::debug!(table, outcome = ?other, "Table ready"),
            }
        }

        let auto_sync = if config.auto_sync {
            AutoSync::spawn(transport.clone(), config.auto_sync_queue)
        } else {
            AutoSync::disabled()
        };

        let watchdog = UpdateWatchdog::new(config.version_url.clone(), config.app_version.clone())
            .with_cooldown(config.update_cooldown)
            .preserve(config.database_name.clone());

        tracing::info!(
            store = %store.name(),
            backend = %config.backend_url,
            auto_sync = config.auto_sync,
            "Application context initialized"
        );

        Ok(Self {
            tasks: TaskService::new(store.clone()),
            todos: TodoService::new(store.clone()),
            sync: Arc::new(SyncOrchestrator::new(transport, connectivity)),
            auto_sync,
            watchdog,
            store,
            config,
        })
    }

    /// Like [`AppContext::init`], but a startup failure becomes
    /// [`Boot::Degraded`].
    pub async fn boot(config: Config) -> Boot {
        match Self::init(config).await {
            Ok(ctx) => Boot::Ready(Box::new(ctx)),
            Err(error) => {
                tracing::error!(error = %error, "Local store unavailable, starting degraded");
                Boot::Degraded { error }
            }
        }
    }

    /// Create a task locally, then queue it for the backend.
    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        let task = self.tasks.create(new).await?;
        self.auto_sync.auto_sync_task(&task);
        Ok(task)
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let task = self.tasks.update(id, patch).await?;
        self.auto_sync.auto_sync_task(&task);
        Ok(task)
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.tasks.delete(id).await?;
        self.auto_sync.auto_delete_task(id);
        Ok(())
    }

    /// Drain the auto-sync queue and close the store.
    pub async fn teardown(mut self) {
        self.auto_sync.shutdown().await;
        self.store.close().await;
        tracing::info!("Application context torn down");
    }
}
