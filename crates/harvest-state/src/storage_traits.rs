//! Storage trait definitions for harvest-sink
//!
//! These traits define the two storage capabilities the ingest core needs:
//! - `RecordStore`: upsert of `AgencyMonthlyInfo` records (document/relational DB)
//! - `ObjectStore`: upload of produced artifacts (package and raw files)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{AgencyMonthlyInfo, BackupDescriptor, RecordKey};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// RecordStore: canonical record persistence
// ---------------------------------------------------------------------------

/// Store for canonical records, bound to one collection/table.
///
/// Guarantees:
/// - `store(record)` is an upsert on `record.key()`: storing the same
///   (agency, month, year) twice leaves exactly one record.
/// - `get(key)` returns the last stored record for that key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name used in logs and dispatch reports.
    fn name(&self) -> &str;

    /// Collection/table this store writes to.
    fn collection(&self) -> &str;

    /// Insert or replace the record for `record.key()`.
    async fn store(&self, record: &AgencyMonthlyInfo) -> StorageResult<()>;

    /// Fetch the record for `key`, if any.
    async fn get(&self, key: &RecordKey) -> StorageResult<Option<AgencyMonthlyInfo>>;
}

// ---------------------------------------------------------------------------
// ObjectStore: artifact persistence
// ---------------------------------------------------------------------------

/// Blob store for collection artifacts, namespaced by agency.
///
/// Guarantees:
/// - `upload_file` returns a descriptor whose `hash`/`size` describe the
///   uploaded bytes.
/// - `backup` returns exactly one descriptor per input path, in input order.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a single file under the agency prefix.
    async fn upload_file(&self, path: &Path, agency_id: &str) -> StorageResult<BackupDescriptor>;

    /// Upload every file, stopping at the first failure.
    async fn backup(
        &self,
        paths: &[PathBuf],
        agency_id: &str,
    ) -> StorageResult<Vec<BackupDescriptor>> {
        let mut descriptors = Vec::with_capacity(paths.len());
        for path in paths {
            descriptors.push(self.upload_file(path, agency_id).await?);
        }
        Ok(descriptors)
    }
}

/// Check that a collection/table name is a plain identifier.
///
/// Backends interpolate the name into DDL, so only `[A-Za-z_][A-Za-z0-9_]*`
/// (at most 63 chars) is accepted.
pub fn validate_collection(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StorageError::InvalidCollection {
            name: name.to_string(),
        })
    }
}

/// Object key for a file: `<agency>/<file name>`.
pub fn object_key(path: &Path, agency_id: &str) -> StorageResult<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::Upload {
            path: path.to_path_buf(),
            reason: "path has no file name".to_string(),
        })?;
    Ok(format!("{}/{}", agency_id.to_lowercase(), file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_uses_file_name_and_lowercase_agency() {
        let key = object_key(Path::new("/tmp/out/trt13-2020-1.zip"), "TRT13").unwrap();
        assert_eq!(key, "trt13/trt13-2020-1.zip");
    }

    #[test]
    fn collection_names_must_be_identifiers() {
        assert!(validate_collection("agency_monthly_info").is_ok());
        assert!(validate_collection("_errors2").is_ok());
        assert!(validate_collection("").is_err());
        assert!(validate_collection("2020").is_err());
        assert!(validate_collection("mi; DROP TABLE mi").is_err());
        assert!(validate_collection(&"a".repeat(64)).is_err());
    }

    #[test]
    fn object_key_rejects_paths_without_file_name() {
        let err = object_key(Path::new("/"), "trt13").unwrap_err();
        assert!(matches!(err, StorageError::Upload { .. }));
    }
}
