//! Detection of newer deployments and waiting service-worker updates.
//!
//! ```text
//! NoUpdate -> UpdateAvailable -> Reloading
//!                  |
//!               dismiss
//!                  v
//!        Suppressed { until } --tick--> NoUpdate
//! ```
//!
//! The watchdog shares nothing with the sync orchestrator. Checks never fail
//! loudly: an unreachable version endpoint leaves the state as it was.

use crate::record::now_millis;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// How long a dismissed prompt stays hidden.
pub const DEFAULT_DISMISS_COOLDOWN: Duration = Duration::from_secs(5 * 60);

const VERSION_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of the version descriptor endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub timestamp: i64,
    pub updated: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateKind {
    /// A different build is deployed
    Deployment,
    /// A new service worker is installed and waiting
    ServiceWorker,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum UpdateState {
    #[default]
    NoUpdate,
    UpdateAvailable {
        kind: UpdateKind,
        version: Option<String>,
    },
    Reloading,
    Suppressed {
        until: DateTime<Utc>,
    },
}

/// Query parameters that defeat intermediate caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBust {
    pub v: String,
    pub cb: String,
}

impl CacheBust {
    pub fn fresh() -> Self {
        Self {
            v: now_millis().to_string(),
            cb: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("no version URL configured")]
    NotConfigured,
    #[error("version request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("version endpoint returned HTTP {0}")]
    Status(u16),
}

/// The environment that can drop caches and restart the app.
#[async_trait]
pub trait ReloadHost: Send + Sync {
    /// Drop cached assets and storage except the `preserve` keys.
    async fn clear_caches(&self, preserve: &[String]) -> Result<(), String>;

    /// Tell a waiting service worker to take over. Returns `false` when none
    /// is waiting.
    async fn activate_waiting_worker(&self) -> bool;

    fn reload(&self, bust: &CacheBust);
}

pub struct UpdateWatchdog {
    http: reqwest::Client,
    version_url: Option<String>,
    current_version: String,
    cooldown: Duration,
    /// Storage keys that survive a cache clear.
    preserve: Vec<String>,
    state: watch::Sender<UpdateState>,
}

impl UpdateWatchdog {
    pub fn new(version_url: Option<String>, current_version: impl Into<String>) -> Self {
        let (state, _) = watch::channel(UpdateState::default());
        Self {
            http: reqwest::Client::new(),
            version_url,
            current_version: current_version.into(),
            cooldown: DEFAULT_DISMISS_COOLDOWN,
            preserve: vec!["user-preferences".to_string(), "app_version".to_string()],
            state,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Keep `key` when caches are cleared.
    pub fn preserve(mut self, key: impl Into<String>) -> Self {
        self.preserve.push(key.into());
        self
    }

    pub fn state(&self) -> UpdateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateState> {
        self.state.subscribe()
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Fetch the deployed version descriptor, bypassing caches.
    pub async fn fetch_version(&self) -> Result<VersionInfo, WatchdogError> {
        let url = self.version_url.as_deref().ok_or(WatchdogError::NotConfigured)?;
        let bust = CacheBust::fresh();

        let response = self
            .http
            .get(url)
            .query(&[("v", bust.v.as_str()), ("cb", bust.cb.as_str())])
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .timeout(VERSION_FETCH_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WatchdogError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Compare the deployed version with the running one.
    pub async fn check_for_update(&self) -> UpdateState {
        self.tick(Utc::now());
        if matches!(
            self.state(),
            UpdateState::Suppressed { .. } | UpdateState::Reloading
        ) {
            return self.state();
        }

        match self.fetch_version().await {
            Ok(info) if info.version != self.current_version => {
                tracing::info!(
                    running = %self.current_version,
                    deployed = %info.version,
                    "New deployment available"
                );
                self.detect(UpdateKind::Deployment, Some(info.version));
            }
            Ok(_) => tracing::debug!("Running the deployed version"),
            Err(WatchdogError::NotConfigured) => {}
            Err(err) => tracing::debug!(error = %err, "Update check failed"),
        }
        self.state()
    }

    /// A new service worker finished installing and is waiting.
    pub fn notify_service_worker_waiting(&self) -> UpdateState {
        self.tick(Utc::now());
        tracing::info!("Service worker update waiting");
        self.detect(UpdateKind::ServiceWorker, None);
        self.state()
    }

    /// Hide the prompt until the cooldown has passed.
    pub fn dismiss(&self) {
        self.dismiss_at(Utc::now());
    }

    pub fn dismiss_at(&self, now: DateTime<Utc>) {
        let until = later(now, self.cooldown);
        self.state.send_modify(|state| {
            if matches!(state, UpdateState::UpdateAvailable { .. }) {
                *state = UpdateState::Suppressed { until };
            }
        });
        tracing::debug!(%until, "Update prompt dismissed");
    }

    /// Lift an expired suppression.
    pub fn tick(&self, now: DateTime<Utc>) {
        self.state.send_if_modified(|state| match state {
            UpdateState::Suppressed { until } if *until <= now => {
                *state = UpdateState::NoUpdate;
                true
            }
            _ => false,
        });
    }

    /// Apply the pending update. Returns `false` if there was none.
    pub async fn accept(&self, host: &dyn ReloadHost) -> bool {
        let kind = match self.state() {
            UpdateState::UpdateAvailable { kind, .. } => kind,
            _ => return false,
        };
        self.state.send_replace(UpdateState::Reloading);

        if kind == UpdateKind::ServiceWorker && host.activate_waiting_worker().await {
            tracing::info!("Activated waiting service worker");
            host.reload(&CacheBust::fresh());
            return true;
        }

        if let Err(err) = host.clear_caches(&self.preserve).await {
            tracing::error!(error = %err, "Cache clear failed, reloading anyway");
        }
        host.reload(&CacheBust::fresh());
        true
    }

    fn detect(&self, kind: UpdateKind, version: Option<String>) {
        self.state.send_if_modified(|state| match state {
            UpdateState::NoUpdate => {
                *state = UpdateState::UpdateAvailable { kind, version };
                true
            }
            _ => false,
        });
    }
}

/// `now + by`, saturating at the latest representable instant.
fn later(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| now.checked_add_signed(by))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl std::fmt::Debug for UpdateWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateWatchdog")
            .field("version_url", &self.version_url)
            .field("current_version", &self.current_version)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
