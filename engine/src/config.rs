//! Configuration loaded from the environment.

use crate::store::StoreLocation;
use crate::sync::auto::DEFAULT_QUEUE_CAPACITY;
use crate::sync::client::{DEFAULT_HEALTH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::watchdog::DEFAULT_DISMISS_COOLDOWN;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Logical name of the local database.
pub const DEFAULT_DATABASE_NAME: &str = "ordo-db";

pub const DEFAULT_BACKEND_URL: &str = "https://ordo-sync-backend.vercel.app";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Fixed logical name the store is addressed by
    pub database_name: String,
    /// Base URL of the sync backend
    pub backend_url: String,
    pub health_timeout: Duration,
    pub request_timeout: Duration,
    /// Push every local write in the background
    pub auto_sync: bool,
    pub auto_sync_queue: usize,
    /// Version descriptor polled by the update watchdog
    pub version_url: Option<String>,
    pub update_cooldown: Duration,
    /// Version of the running build
    pub app_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ordo"),
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auto_sync: true,
            auto_sync_queue: DEFAULT_QUEUE_CAPACITY,
            version_url: None,
            update_cooldown: DEFAULT_DISMISS_COOLDOWN,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_dir = env::var("ORDO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let database_name = env::var("ORDO_DATABASE_NAME").unwrap_or(defaults.database_name);
        if database_name.is_empty() {
            return Err(ConfigError::Invalid("ORDO_DATABASE_NAME"));
        }

        let backend_url = env::var("SYNC_BACKEND_URL").unwrap_or(defaults.backend_url);

        let health_timeout = parse_var::<u64>("SYNC_HEALTH_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.health_timeout);
        let request_timeout = parse_var::<u64>("SYNC_REQUEST_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);

        let auto_sync = parse_var("ORDO_AUTO_SYNC")?.unwrap_or(defaults.auto_sync);
        let auto_sync_queue = parse_var("ORDO_AUTO_SYNC_QUEUE")?.unwrap_or(defaults.auto_sync_queue);

        let version_url = env::var("ORDO_VERSION_URL").ok().filter(|u| !u.is_empty());
        let update_cooldown = parse_var::<u64>("ORDO_UPDATE_COOLDOWN_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.update_cooldown);
        let app_version = env::var("ORDO_APP_VERSION").unwrap_or(defaults.app_version);

        Ok(Self {
            data_dir,
            database_name,
            backend_url,
            health_timeout,
            request_timeout,
            auto_sync,
            auto_sync_queue,
            version_url,
            update_cooldown,
            app_version,
        })
    }

    pub fn store_location(&self) -> StoreLocation {
        StoreLocation::named(self.data_dir.clone(), self.database_name.clone())
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}
