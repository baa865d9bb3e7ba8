//! Shared application context.
//!
//! The scan pipeline and the HTTP handlers both hold an [`AppContext`]: the
//! record store, the clock, and the collection records live under.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::clock::{format_timestamp, Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::{self, KeyPath, PersistenceGateway};
use crate::identifier::CardId;
use crate::record::{profiles_from_document, Field, Profile, ScanRecord};

/// Store handle plus clock, passed explicitly to everything that needs them.
#[derive(Debug, Clone)]
pub struct AppContext {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    collection: String,
}

impl AppContext {
    /// Create a context over `gateway` and `clock`.
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            clock,
            collection: collection.into(),
        }
    }

    /// Open the configured store with the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the clock offsets
    /// are out of range.
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway = gateway::open(config)?;
        let clock = SystemClock::from_config(&config.clock)?;
        Ok(Self::new(
            gateway,
            Arc::new(clock),
            config.store.collection.clone(),
        ))
    }

    /// The record store.
    #[must_use]
    pub fn gateway(&self) -> &dyn PersistenceGateway {
        self.gateway.as_ref()
    }

    /// The clock scans are stamped with.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Name of the collection records live under.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Current time as shown on the status page.
    #[must_use]
    pub fn formatted_time(&self) -> String {
        format_timestamp(self.clock.now())
    }

    /// Persist a scan: `uid` then `last_scanned`. `name` is never touched.
    ///
    /// Stops at the first failed write and returns its error.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error if a write fails.
    pub async fn store_scan(&self, record: &ScanRecord) -> Result<()> {
        for (field, value) in record.scan_fields() {
            let path = KeyPath::field(&self.collection, &record.identifier, field)?;
            self.gateway.upsert_field(&path, value).await?;
        }
        debug!("Stored scan of {}", record.identifier);
        Ok(())
    }

    /// Set the display name for a card.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error if the write fails.
    pub async fn rename(&self, id: &CardId, name: &str) -> Result<()> {
        let path = KeyPath::field(&self.collection, id, Field::Name)?;
        self.gateway.upsert_field(&path, name).await?;
        info!("Renamed {} to {:?}", id, name);
        Ok(())
    }

    /// The whole collection as a JSON document.
    ///
    /// An empty collection reads as `{}`.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error if the read fails.
    pub async fn read_all(&self) -> Result<Value> {
        let path = KeyPath::new([self.collection.as_str()])?;
        match self.gateway.read_subtree(&path).await {
            Ok(document) => Ok(document),
            Err(e) if e.is_not_found() => Ok(Value::Object(Map::new())),
            Err(e) => Err(e),
        }
    }

    /// All records as profile rows, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error if the read fails.
    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        Ok(profiles_from_document(&self.read_all().await?))
    }
}
