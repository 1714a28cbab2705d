//! Cloud sync: wire protocol, HTTP transport, orchestration and the
//! background auto-sync queue.

pub mod auto;
pub mod client;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod wire;

pub use auto::{AutoSync, AutoSyncJob, AutoSyncStats, Enqueue};
pub use client::{BidirectionalOutcome, SyncClient, SyncTransport};
pub use error::{SyncError, SyncFailure, SyncOutcome};
pub use merge::{resolve, MergeReport, Resolution};
pub use orchestrator::{
    AlwaysOnline, Connectivity, MergeSyncReport, OnlineFlag, PullReport, PushReport,
    SyncOrchestrator, SyncPhase, SyncState, SyncStats,
};
pub use wire::{
    DeleteResponse, PullResponse, PushError, PushRequest, PushResponse, PushResults, SyncRecord,
};
