//! Scan records and the stored document layout.
//!
//! A record lives under `/<collection>/<identifier>/` as three scalar fields:
//! `uid`, `last_scanned` and `name`. Scans only ever write the first two, so
//! a display name set through the web UI survives any number of rescans.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::{format_timestamp, Clock};
use crate::identifier::CardId;

/// A field stored under a record's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// The canonical identifier, repeated inside the record.
    Uid,
    /// Formatted time of the most recent scan.
    LastScanned,
    /// Human-assigned display name.
    Name,
}

impl Field {
    /// The key used in the store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uid => "uid",
            Self::LastScanned => "last_scanned",
            Self::Name => "name",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One card's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// Canonical card identifier; the record's primary key.
    pub identifier: CardId,
    /// `YYYY-MM-DD HH:MM:SS` local time, or the unsynchronized sentinel.
    pub timestamp: String,
    /// Optional label, only ever set by a rename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ScanRecord {
    /// Pair an identifier with a clock reading.
    ///
    /// `None` means the clock is not synchronized; the timestamp becomes
    /// [`crate::clock::TIME_NOT_AVAILABLE`] rather than a made-up time.
    #[must_use]
    pub fn build(identifier: CardId, now: Option<NaiveDateTime>) -> Self {
        Self {
            identifier,
            timestamp: format_timestamp(now),
            display_name: None,
        }
    }

    /// Build a record stamped with the current time of `clock`.
    #[must_use]
    pub fn stamped(identifier: CardId, clock: &dyn Clock) -> Self {
        Self::build(identifier, clock.now())
    }

    /// The fields a scan writes, in write order. Never includes [`Field::Name`].
    #[must_use]
    pub fn scan_fields(&self) -> [(Field, &str); 2] {
        [
            (Field::Uid, self.identifier.as_str()),
            (Field::LastScanned, self.timestamp.as_str()),
        ]
    }
}

/// A row of the profiles listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    /// Key the record is stored under; renames address this.
    pub key: String,
    /// Card identifier as stored in the record.
    pub uid: String,
    /// Display name, if one was set.
    pub name: Option<String>,
    /// Last scan time, if the card was ever scanned.
    pub last_scanned: Option<String>,
}

/// Flatten a collection document into profile rows, ordered by key.
///
/// Children that are not objects are skipped. A record that was renamed but
/// never scanned has no `uid` field; its key is used instead.
#[must_use]
pub fn profiles_from_document(document: &Value) -> Vec<Profile> {
    let Some(records) = document.as_object() else {
        return Vec::new();
    };

    let mut profiles: Vec<Profile> = records
        .iter()
        .filter_map(|(key, record)| {
            let Some(fields) = record.as_object() else {
                debug!("Skipping non-record entry at {}", key);
                return None;
            };
            let text = |field: Field| {
                fields
                    .get(field.as_str())
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            Some(Profile {
                key: key.clone(),
                uid: text(Field::Uid).unwrap_or_else(|| key.clone()),
                name: text(Field::Name),
                last_scanned: text(Field::LastScanned),
            })
        })
        .collect();
    profiles.sort_by(|a, b| a.key.cmp(&b.key));
    profiles
}
