//! Core error types for epochtap-core.
//!
//! A storage error aborts the operation. A [`DeliveryError`] never reaches
//! [`CoreError`]: it is reported in the operation outcome after state has
//! already been committed.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for epochtap-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Operation on an entity that was never activated (or was reset).
    #[error("entity '{key}' is not tracked")]
    NotFound { key: String },

    /// Evaluation requested for a record with `active = false`.
    #[error("entity '{key}' is inactive")]
    InactiveEntity { key: String },

    /// Snapshot store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True for the two "activate first" outcomes.
    pub fn is_untracked(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound { .. } | CoreError::InactiveEntity { .. }
        )
    }
}

/// Snapshot store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to read the snapshot
    #[error("Failed to read snapshot at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the snapshot
    #[error("Failed to write snapshot at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to take the cross-process lock guarding writes
    #[error("Failed to lock snapshot at {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot exists but cannot be decoded
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    /// SQLite backend failure
    #[error("Query failed: {0}")]
    Sqlite(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Transport errors.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The destination refused the message
    #[error("delivery to '{destination}' rejected: {message}")]
    Rejected {
        destination: String,
        message: String,
    },

    /// Transport could not be reached at all
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the config tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::Sqlite(err.to_string())
                }
            }
            _ => StorageError::Sqlite(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
