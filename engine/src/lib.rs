//! # Ordo Sync
//!
//! Offline-first storage and cloud sync for Ordo tasks.
//!
//! The local database is the source of truth. Everything here keeps working
//! without a network; syncing with the cloud is a best-effort overlay.
//!
//! ## Components
//!
//! - [`store::LocalStore`]: an embedded SQLite database addressed by a fixed
//!   logical name, so relaunching reattaches to the same data.
//! - [`schema`]: checks the live tables against their canonical definitions
//!   before anything reads them, and recreates a drifted table.
//! - [`service::TaskService`] and [`service::TodoService`]: typed CRUD and
//!   aggregates over the managed tables.
//! - [`sync::SyncClient`]: the HTTP side of sync. Every failure comes back as
//!   a [`sync::SyncFailure`] value.
//! - [`sync::SyncOrchestrator`]: runs pushes and pulls one at a time and
//!   publishes [`sync::SyncState`].
//! - [`sync::AutoSync`]: a bounded background queue pushing individual
//!   writes.
//! - [`watchdog::UpdateWatchdog`]: notices newer deployments and waiting
//!   service workers.
//!
//! [`context::AppContext`] wires these together in the right order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ordo_sync::{AppContext, Boot, Config, NewTask};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = match AppContext::boot(Config::load()?).await {
//!     Boot::Ready(ctx) => ctx,
//!     Boot::Degraded { error } => return Err(error.into()),
//! };
//!
//! let task = ctx.create_task(NewTask::titled("Water the plants")).await?;
//! assert_eq!(ctx.tasks.list().await?.len(), 1);
//!
//! let report = ctx.sync.sync_to_cloud(&[task]).await;
//! println!("{:?}", ctx.sync.state());
//! # let _ = report;
//! ctx.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod record;
pub mod schema;
pub mod service;
pub mod store;
pub mod sync;
pub mod watchdog;

// Re-export main types at crate root
pub use config::{Config, ConfigError};
pub use context::{AppContext, Boot};
pub use error::{Error, Result};
pub use record::{NewTask, NewTodo, Task, TaskPatch, Todo, TodoPatch};
pub use schema::{PrepareOutcome, TableSchema};
pub use service::{Aggregate, TaskService, TaskStats, TodoService};
pub use store::{LocalStore, Param, StoreLocation};
pub use sync::{SyncClient, SyncError, SyncFailure, SyncOrchestrator, SyncPhase, SyncState};
pub use watchdog::{UpdateState, UpdateWatchdog};

/// Type aliases for clarity
pub type RecordId = String;
pub type UserId = String;
/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
