//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRecordStore` and `MemoryObjectStore` that satisfy the trait
//! contracts without any external dependencies. Both count calls and can be
//! switched into a failing mode to exercise error paths.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{AgencyMonthlyInfo, BackupDescriptor, RecordKey};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

/// In-memory record store backed by a `HashMap<RecordKey, AgencyMonthlyInfo>`.
#[derive(Debug)]
pub struct MemoryRecordStore {
    name: String,
    collection: String,
    records: Mutex<HashMap<RecordKey, AgencyMonthlyInfo>>,
    store_calls: AtomicUsize,
    fail: bool,
}

impl MemoryRecordStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self::named("memory", collection)
    }

    /// Create a store reporting `name` in dispatch results.
    pub fn named(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            records: Mutex::new(HashMap::new()),
            store_calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// A store whose every `store` call fails.
    pub fn failing(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::named(name, collection)
        }
    }

    /// Number of `store` calls received, including failed ones.
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    /// Number of distinct records held.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn store(&self, record: &AgencyMonthlyInfo) -> StorageResult<()> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StorageError::Backend(format!(
                "{}: injected store failure",
                self.name
            )));
        }
        let mut records = self.records.lock().unwrap();
        records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> StorageResult<Option<AgencyMonthlyInfo>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(key).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

/// In-memory object store.
///
/// Does not touch the filesystem: the object body is the path itself, so
/// descriptors are deterministic for a given path and agency.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    upload_calls: AtomicUsize,
    backup_calls: AtomicUsize,
    fail: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every upload fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn backup_calls(&self) -> usize {
        self.backup_calls.load(Ordering::SeqCst)
    }

    /// All calls made against this store.
    pub fn total_calls(&self) -> usize {
        self.upload_calls() + self.backup_calls()
    }

    /// Object keys currently held, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn put(&self, path: &Path, agency_id: &str) -> StorageResult<BackupDescriptor> {
        if self.fail {
            return Err(StorageError::Upload {
                path: path.to_path_buf(),
                reason: "injected upload failure".to_string(),
            });
        }
        let key = object_key(path, agency_id)?;
        let body = path.to_string_lossy().into_owned().into_bytes();
        let descriptor = BackupDescriptor::for_bytes(format!("mem://{key}"), &body);
        self.objects.lock().unwrap().insert(key, body);
        Ok(descriptor)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload_file(&self, path: &Path, agency_id: &str) -> StorageResult<BackupDescriptor> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.put(path, agency_id)
    }

    async fn backup(
        &self,
        paths: &[PathBuf],
        agency_id: &str,
    ) -> StorageResult<Vec<BackupDescriptor>> {
        self.backup_calls.fetch_add(1, Ordering::SeqCst);
        paths.iter().map(|p| self.put(p, agency_id)).collect()
    }
}
