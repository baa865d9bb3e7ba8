//! Persistence gateway: the boundary to the record store.
//!
//! Records are addressed by hierarchical key paths of the form
//! `/<collection>/<identifier>/<field>`. A gateway can write a single scalar
//! at such a path and read back everything under a path as a JSON document.
//!
//! Gateways never retry. A failed call surfaces as an [`Error`] whose message
//! is suitable for a log line or an HTTP error body; whether to try again is
//! the caller's decision.

pub mod firebase;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::error::{Error, Result};
use crate::identifier::CardId;
use crate::record::Field;
use crate::retry::RetryPolicy;

pub use firebase::FirebaseGateway;
pub use sqlite::SqliteGateway;

/// Characters that cannot appear in a key path segment.
const FORBIDDEN_SEGMENT_CHARS: &[char] = &['/', '.', '#', '$', '[', ']'];

/// A validated hierarchical key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// The root of the store.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyPath`] if any segment is empty or contains
    /// `/ . # $ [ ]` or control characters.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .try_fold(Self::root(), |path, segment| path.child(segment.as_ref()))
    }

    /// Extend this path by one segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyPath`] if the segment is not usable as a key.
    pub fn child(&self, segment: &str) -> Result<Self> {
        let valid = !segment.is_empty()
            && !segment
                .chars()
                .any(|c| c.is_control() || FORBIDDEN_SEGMENT_CHARS.contains(&c));
        if !valid {
            return Err(Error::InvalidKeyPath {
                segment: segment.to_string(),
            });
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// `/<collection>/<identifier>`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyPath`] if the collection name is not a valid segment.
    pub fn record(collection: &str, id: &CardId) -> Result<Self> {
        Self::new([collection, id.as_str()])
    }

    /// `/<collection>/<identifier>/<field>`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyPath`] if the collection name is not a valid segment.
    pub fn field(collection: &str, id: &CardId, field: Field) -> Result<Self> {
        Self::record(collection, id)?.child(field.as_str())
    }

    /// The path's segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is the store root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// A key-value/document store holding scan records.
#[async_trait]
pub trait PersistenceGateway: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Establish whatever session the store needs before the first call.
    ///
    /// This is the only gateway operation that waits and retries, bounded by
    /// `policy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be reached within the policy.
    async fn connect(&self, policy: &RetryPolicy) -> Result<()> {
        let _ = policy;
        Ok(())
    }

    /// Write one scalar at `path`, replacing anything stored there.
    ///
    /// # Errors
    ///
    /// Returns an error with a human-readable reason if the write failed. A
    /// failed write leaves the store unchanged.
    async fn upsert_field(&self, path: &KeyPath, value: &str) -> Result<()>;

    /// Read everything under `path` as a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if nothing is stored under `path`, or
    /// another error if the call failed.
    async fn read_subtree(&self, path: &KeyPath) -> Result<Value>;
}

/// Open the gateway selected by `config.store.backend`.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialized.
pub fn open(config: &Config) -> Result<Arc<dyn PersistenceGateway>> {
    let gateway: Arc<dyn PersistenceGateway> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteGateway::open(config.sqlite_path())?),
        StoreBackend::Firebase => {
            let url = config.store.database_url.as_deref().ok_or_else(|| {
                Error::ConfigValidation {
                    message: "firebase backend requires database_url".to_string(),
                }
            })?;
            Arc::new(FirebaseGateway::new(
                url,
                config.store.api_key.clone(),
                config.request_timeout(),
            )?)
        }
    };
    info!("Using {} record store", gateway.name());
    Ok(gateway)
}

/// A store whose every call fails, counting the attempted writes.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct UnavailableGateway {
    pub(crate) writes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
#[async_trait]
impl PersistenceGateway for UnavailableGateway {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn upsert_field(&self, path: &KeyPath, _value: &str) -> Result<()> {
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Err(Error::remote(
            format!("write {path}"),
            "HTTP 503: Service Unavailable",
        ))
    }

    async fn read_subtree(&self, path: &KeyPath) -> Result<Value> {
        Err(Error::remote(
            format!("read {path}"),
            "HTTP 503: Service Unavailable",
        ))
    }
}
