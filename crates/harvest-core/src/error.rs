//! Error taxonomy for an ingest run and its exit-status contract.

use std::path::PathBuf;

use harvest_state::StorageError;
use thiserror::Error;

use crate::dispatch::DispatchError;

/// Exit status for processing failures (decode, upload, backup, store).
pub const EXIT_PROCESSING: i32 = 2;
/// Exit status when a backend client cannot be constructed.
pub const EXIT_CLIENT: i32 = 3;
/// Exit status for missing or invalid configuration.
pub const EXIT_CONFIG: i32 = 4;

/// Every error is terminal for the invocation.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("error loading config values: {0}")]
    Config(String),

    #[error("error creating {backend} client: {source}")]
    ClientConstruction {
        backend: String,
        #[source]
        source: StorageError,
    },

    #[error("error reading execution result: {0}")]
    Decode(String),

    #[error("error uploading package {}: {source}", .path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("error backing up {count} files: {source}")]
    Backup {
        count: usize,
        #[source]
        source: StorageError,
    },

    #[error("error storing record: {0}")]
    Store(#[from] DispatchError),
}

impl IngestError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            IngestError::Config(_) => EXIT_CONFIG,
            IngestError::ClientConstruction { .. } => EXIT_CLIENT,
            IngestError::Decode(_)
            | IngestError::Upload { .. }
            | IngestError::Backup { .. }
            | IngestError::Store(_) => EXIT_PROCESSING,
        }
    }
}

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;
