//! Typed failures for the sync boundary.
//!
//! Every Sync Client call resolves to `Ok` or a [`SyncFailure`]; transport
//! errors never escape past it.

use serde::Serialize;
use thiserror::Error;

/// What went wrong during a sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncError {
    #[error("network error")]
    Network,
    #[error("request timed out")]
    Timeout,
    #[error("device is offline")]
    Offline,
    #[error("sync backend is not available")]
    BackendUnavailable,
    #[error("unreadable response from sync backend")]
    Decode,
    /// The backend answered with `success: false`.
    #[error("rejected by sync backend")]
    Rejected,
    #[error("a sync is already in progress")]
    Busy,
    /// Reading or writing the local store failed during a sync.
    #[error("local store error")]
    Store,
}

/// `{ success: false, error, details }` as a Rust value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{error}")]
pub struct SyncFailure {
    pub kind: SyncError,
    /// Short human-readable reason.
    pub error: String,
    pub details: Option<String>,
    /// HTTP status, when the backend answered at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Result of a sync call.
pub type SyncOutcome<T> = std::result::Result<T, SyncFailure>;

impl SyncFailure {
    pub fn new(kind: SyncError, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            details: None,
            status: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Classify a transport error; `error` names the failed operation.
    pub fn from_transport(error: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::Decode
        } else {
            SyncError::Network
        };

        let failure = Self::new(kind, error).with_details(err.to_string());
        match err.status() {
            Some(status) => failure.with_status(status.as_u16()),
            None => failure,
        }
    }

    pub fn offline() -> Self {
        Self::new(SyncError::Offline, "Device is offline")
    }

    pub fn backend_unavailable() -> Self {
        Self::new(SyncError::BackendUnavailable, "Sync backend is not available")
    }

    pub fn busy() -> Self {
        Self::new(SyncError::Busy, "A sync is already in progress")
    }

    pub fn store(err: &crate::Error) -> Self {
        Self::new(SyncError::Store, "Local store error").with_details(err.to_string())
    }

    /// The backend reported the record as absent.
    pub fn is_not_found(&self) -> bool {
        self.kind == SyncError::Rejected && self.status == Some(404)
    }
}
