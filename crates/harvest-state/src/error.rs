//! Error types for harvest-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by record stores and object stores.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Could not open or authenticate a backend connection
    #[error("Backend connection failed: {0}")]
    Connection(String),

    /// Backend rejected or failed a query/request
    #[error("Backend operation failed: {0}")]
    Backend(String),

    /// Record (de)serialization failed
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Collection/table name is not a safe identifier
    #[error("Invalid collection name: {name:?}")]
    InvalidCollection { name: String },

    /// Local file could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Object store refused an upload
    #[error("Upload of {path} failed: {reason}")]
    Upload { path: PathBuf, reason: String },

    /// Object store authentication failed
    #[error("Object store authentication failed: {0}")]
    Auth(String),
}

impl StorageError {
    /// Wrap an `std::io::Error` together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
