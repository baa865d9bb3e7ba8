//! Error types for cardlog.
//!
//! This module defines the error type shared by the identifier, storage,
//! configuration and startup code, with enough context for log lines and
//! HTTP responses to carry a human-readable reason.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for cardlog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Identifier Errors ===
    /// The reader reported a card with no identifier bytes.
    #[error("card identifier is empty")]
    EmptyIdentifier,

    /// A textual identifier could not be parsed as hex bytes.
    #[error("invalid card identifier '{input}': {reason}")]
    InvalidIdentifier {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A key path segment cannot be used in the store.
    #[error("invalid key path segment '{segment}'")]
    InvalidKeyPath {
        /// The offending segment.
        segment: String,
    },

    // === Store Errors ===
    /// Nothing is stored under the requested path.
    #[error("no data at {path}")]
    NotFound {
        /// The path that was read.
        path: String,
    },

    /// A call to the remote store failed.
    #[error("{operation} failed: {reason}")]
    Remote {
        /// The store operation, e.g. `write /rfid/041A/uid`.
        operation: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Anonymous sign-in against the cloud store failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Failed to open or create the local database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A local database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Generic Errors ===
    /// A bounded wait ran out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for cardlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a remote store error.
    #[must_use]
    pub fn remote(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid identifier error.
    #[must_use]
    pub fn invalid_identifier(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error means the requested path holds no data.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error was caused by bad caller input rather than the store.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyIdentifier | Self::InvalidIdentifier { .. } | Self::InvalidKeyPath { .. }
        )
    }
}
