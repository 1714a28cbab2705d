//! HTTP client for the sync backend.

use super::error::{SyncError, SyncFailure, SyncOutcome};
use super::wire::{DeleteResponse, PullResponse, PushRequest, PushResponse, PushResults, SyncRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Timeout for the `/health` probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for push, pull and delete requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a push followed by a pull.
#[derive(Debug, Clone, PartialEq)]
pub struct BidirectionalOutcome {
    pub push: SyncOutcome<PushResults>,
    pub pull: SyncOutcome<Vec<SyncRecord>>,
}

impl BidirectionalOutcome {
    pub fn success(&self) -> bool {
        self.push.is_ok() && self.pull.is_ok()
    }
}

/// The network side of sync.
///
/// Implementations must not panic and must turn every failure into a
/// [`SyncFailure`].
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Whether the backend answers its health probe.
    async fn is_online(&self) -> bool;

    /// Upsert `records` by id on the backend.
    async fn push_tasks(&self, records: &[SyncRecord]) -> SyncOutcome<PushResults>;

    async fn pull_tasks(&self) -> SyncOutcome<Vec<SyncRecord>>;

    /// Records updated at or after `since`.
    async fn pull_tasks_since(&self, since: DateTime<Utc>) -> SyncOutcome<Vec<SyncRecord>>;

    async fn delete_task(&self, id: &str) -> SyncOutcome<()>;

    /// Push `local`, then pull everything changed since `last_sync`, or
    /// everything when it is `None`.
    async fn sync_bidirectional(
        &self,
        local: &[SyncRecord],
        last_sync: Option<DateTime<Utc>>,
    ) -> BidirectionalOutcome {
        let push = self.push_tasks(local).await;
        let pull = match last_sync {
            Some(since) => self.pull_tasks_since(since).await,
            None => self.pull_tasks().await,
        };
        BidirectionalOutcome { push, pull }
    }
}

/// [`SyncTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct SyncClient {
    http: Client,
    base_url: String,
    health_timeout: Duration,
    request_timeout: Duration,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeouts(base_url, DEFAULT_HEALTH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        health_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            health_timeout,
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn pull(&self, path: &str, error: &str) -> SyncOutcome<Vec<SyncRecord>> {
        let response = self
            .http
            .get(self.url(path))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| SyncFailure::from_transport(error, &e))?;

        let (status, body) = decode::<PullResponse>(response, error).await?;
        if !body.success {
            return Err(rejected(status, body.error, body.details, error));
        }
        Ok(body.tasks)
    }
}

/// Decode a JSON body regardless of status, keeping the status for errors.
async fn decode<T: DeserializeOwned>(response: Response, error: &str) -> SyncOutcome<(u16, T)> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SyncFailure::from_transport(error, &e))?;

    serde_json::from_slice(&bytes)
        .map(|body| (status, body))
        .map_err(|e| {
            SyncFailure::new(SyncError::Decode, error)
                .with_details(format!("HTTP {status}: {e}"))
                .with_status(status)
        })
}

fn rejected(
    status: u16,
    reported: Option<String>,
    details: Option<String>,
    fallback: &str,
) -> SyncFailure {
    let mut failure = SyncFailure::new(
        SyncError::Rejected,
        reported.unwrap_or_else(|| fallback.to_string()),
    )
    .with_status(status);
    failure.details = details;
    failure
}

#[async_trait]
impl SyncTransport for SyncClient {
    async fn is_online(&self) -> bool {
        match self
            .http
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!(error = %err, "Health probe failed");
                false
            }
        }
    }

    async fn push_tasks(&self, records: &[SyncRecord]) -> SyncOutcome<PushResults> {
        const ERROR: &str = "Failed to push tasks";

        let request = PushRequest {
            tasks: records.to_vec(),
        };
        let response = self
            .http
            .post(self.url("/sync/tasks"))
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncFailure::from_transport(ERROR, &e))?;

        let (status, body) = decode::<PushResponse>(response, ERROR).await?;
        if !body.success {
            return Err(rejected(status, body.error, body.details, ERROR));
        }

        let results = body.results.unwrap_or_default();
        tracing::debug!(
            sent = records.len(),
            created = results.created,
            updated = results.updated,
            errors = results.errors.len(),
            "Pushed tasks"
        );
        Ok(results)
    }

    async fn pull_tasks(&self) -> SyncOutcome<Vec<SyncRecord>> {
        self.pull("/sync/tasks", "Failed to pull tasks").await
    }

    async fn pull_tasks_since(&self, since: DateTime<Utc>) -> SyncOutcome<Vec<SyncRecord>> {
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.pull(
            &format!("/sync/tasks/since/{since}"),
            "Failed to pull recent tasks",
        )
        .await
    }

    async fn delete_task(&self, id: &str) -> SyncOutcome<()> {
        const ERROR: &str = "Failed to delete task from cloud";

        let response = self
            .http
            .delete(self.url(&format!("/sync/tasks/{id}")))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| SyncFailure::from_transport(ERROR, &e))?;

        let (status, body) = decode::<DeleteResponse>(response, ERROR).await?;
        if !body.success {
            return Err(rejected(status, body.error, body.details, ERROR));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = SyncClient::new("http://localhost:3001/");
        assert_eq!(client.base_url(), "http://localhost:3001");
        assert_eq!(client.url("/health"), "http://localhost:3001/health");
    }

    #[tokio::test]
    async fn unreachable_backend_is_offline_not_an_error() {
        // Port 9 (discard) on loopback is closed in test environments.
        let client = SyncClient::with_timeouts(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            Duration::from_millis(500),
        );
        assert!(!client.is_online().await);

        let failure = client.pull_tasks().await.unwrap_err();
        assert!(matches!(
            failure.kind,
            SyncError::Network | SyncError::Timeout
        ));
        assert_eq!(failure.error, "Failed to pull tasks");
        assert!(failure.details.is_some());
    }
}
