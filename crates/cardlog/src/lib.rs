//! `cardlog` - Record RFID card scans and browse them over HTTP
//!
//! A card reader reports UID bytes; each scan is normalized to an uppercase
//! hex identifier, stamped with the local time and written field by field to
//! a record store (Firebase Realtime Database or a local `SQLite` file). A
//! small web UI lists the records, lets users name cards and exports the data
//! as JSON.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod identifier;
pub mod logging;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod retry;
pub mod server;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use context::AppContext;
pub use error::{Error, Result};
pub use gateway::{KeyPath, PersistenceGateway};
pub use identifier::CardId;
pub use logging::init_logging;
pub use pipeline::{ScanOutcome, ScanPipeline};
pub use reader::{CardReader, LineReader, StopHandle};
pub use record::ScanRecord;
