//! Configuration management for cardlog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "cardlog";

/// Default local database file name.
const DATABASE_FILE_NAME: &str = "cards.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CARDLOG_`, sections split on `__`)
/// 2. TOML config file at `~/.config/cardlog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Web front end configuration.
    pub server: ServerConfig,
    /// Record store configuration.
    pub store: StoreConfig,
    /// Cloud sign-in configuration.
    pub auth: AuthConfig,
    /// Clock configuration.
    pub clock: ClockConfig,
    /// Card reader configuration.
    pub reader: ReaderConfig,
}

/// Web front end configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Serve the web UI while running.
    pub enabled: bool,
    /// Address to listen on.
    pub bind_addr: String,
}

/// Which store records are written to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Local `SQLite` file.
    #[default]
    Sqlite,
    /// Firebase Realtime Database over REST.
    Firebase,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Firebase => write!(f, "firebase"),
        }
    }
}

/// Record store configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store backend.
    pub backend: StoreBackend,
    /// Top-level collection records live under.
    pub collection: String,
    /// Realtime Database URL, e.g. `https://example-default-rtdb.firebaseio.com/`.
    pub database_url: Option<String>,
    /// Web API key used for anonymous sign-in. Without one, requests are
    /// sent unauthenticated.
    pub api_key: Option<String>,
    /// Path to the local database file.
    /// Defaults to `~/.local/share/cardlog/cards.db`
    pub sqlite_path: Option<PathBuf>,
    /// Per-request timeout for cloud calls, in seconds.
    pub request_timeout_secs: u64,
}

/// Anonymous sign-in wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Maximum sign-in attempts at startup.
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    pub retry_interval_ms: u64,
    /// Overall time budget for signing in, in seconds.
    pub timeout_secs: u64,
}

/// Clock configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Fixed offset from UTC in seconds. Uses the system time zone when unset.
    pub utc_offset_secs: Option<i32>,
    /// Extra daylight-saving offset in seconds, added to `utc_offset_secs`.
    pub daylight_offset_secs: i32,
    /// Number of checks before giving up on clock synchronization.
    pub sync_max_attempts: u32,
    /// Delay between synchronization checks in milliseconds.
    pub sync_interval_ms: u64,
}

/// Card reader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Device or file emitting one UID per line. Reads stdin when unset.
    pub device: Option<PathBuf>,
    /// Interval between presence checks in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            collection: "rfid".to_string(),
            database_url: None,
            api_key: None,
            sqlite_path: None, // Will be resolved to default at runtime
            request_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("collection", &self.collection)
            .field("database_url", &self.database_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("sqlite_path", &self.sqlite_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_interval_ms: 1_000,
            timeout_secs: 30,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: None,
            daylight_offset_secs: 0,
            sync_max_attempts: 10,
            sync_interval_ms: 1_000,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            device: None,
            poll_interval_ms: 50,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CARDLOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let collection = regex::Regex::new(r"^[A-Za-z0-9_-]+$")
            .map_err(|e| Error::internal(format!("collection pattern: {e}")))?;
        if !collection.is_match(&self.store.collection) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "collection '{}' may only contain letters, digits, '_' and '-'",
                    self.store.collection
                ),
            });
        }

        if self.store.backend == StoreBackend::Firebase {
            let url = self.store.database_url.as_deref().unwrap_or_default();
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::ConfigValidation {
                    message: "firebase backend requires database_url starting with http:// or https://"
                        .to_string(),
                });
            }
        }

        if self.store.request_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "request_timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.reader.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.clock.sync_max_attempts == 0 {
            return Err(Error::ConfigValidation {
                message: "sync_max_attempts must be greater than 0".to_string(),
            });
        }

        if self.auth.max_attempts == 0 || self.auth.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "auth max_attempts and timeout_secs must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the local database path, resolving defaults if not set.
    #[must_use]
    pub fn sqlite_path(&self) -> PathBuf {
        self.store
            .sqlite_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the reader poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reader.poll_interval_ms)
    }

    /// Get the per-request timeout for cloud calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.store.request_timeout_secs)
    }

    /// Retry policy for the startup sign-in wait.
    #[must_use]
    pub fn auth_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.auth.max_attempts,
            Duration::from_millis(self.auth.retry_interval_ms),
        )
        .with_backoff(2, Duration::from_secs(8))
        .with_timeout(Duration::from_secs(self.auth.timeout_secs))
    }
}
