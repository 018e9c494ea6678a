//! Trait contract tests for RecordStore and ObjectStore.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using in-memory fakes and the in-memory SurrealDB engine.

use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use harvest_state::fakes::{MemoryObjectStore, MemoryRecordStore};
use harvest_state::storage_traits::*;
use harvest_state::{
    AgencyMonthlyInfo, BackupDescriptor, ExecDuration, FsObjectStore, ProcInfo, RecordKey,
    StorageError, SurrealRecordStore,
};

fn sample_record(agency: &str, month: u32, year: u32) -> AgencyMonthlyInfo {
    let mut record = AgencyMonthlyInfo::new(
        agency,
        month,
        year,
        Utc.with_ymd_and_hms(2020, 2, 3, 4, 5, 6).unwrap(),
    );
    record.exec_duration = ExecDuration::Millis(1200);
    record
}

fn failed_record(agency: &str, month: u32, year: u32) -> AgencyMonthlyInfo {
    let mut record = sample_record(agency, month, year);
    record.proc_info = Some(ProcInfo {
        cmd: "python3 crawler.py".to_string(),
        cmd_dir: "/crawler".to_string(),
        stderr: "Traceback".to_string(),
        status: 1,
        env: vec!["MONTH=1".to_string(), "YEAR=2020".to_string()],
        ..ProcInfo::default()
    });
    record.package = Some(BackupDescriptor::for_bytes("mem://pkg", b"zip"));
    record.backups = Some(vec![BackupDescriptor::for_bytes("mem://a", b"a")]);
    record
}

// ===========================================================================
// RecordStore contract tests (fake)
// ===========================================================================

#[tokio::test]
async fn memory_store_get_round_trip() {
    let store = MemoryRecordStore::new("agency_monthly_info");
    let record = failed_record("trt13", 1, 2020);
    store.store(&record).await.unwrap();

    let fetched = store.get(&record.key()).await.unwrap();
    assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn memory_store_upserts_same_key() {
    let store = MemoryRecordStore::new("agency_monthly_info");
    store.store(&sample_record("trt13", 1, 2020)).await.unwrap();
    store.store(&failed_record("TRT13", 1, 2020)).await.unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.store_calls(), 2);
    let fetched = store
        .get(&RecordKey::new("trt13", 1, 2020))
        .await
        .unwrap()
        .unwrap();
    assert!(fetched.proc_info.is_some(), "last write wins");
}

#[tokio::test]
async fn memory_store_keeps_distinct_months_apart() {
    let store = MemoryRecordStore::new("agency_monthly_info");
    store.store(&sample_record("trt13", 1, 2020)).await.unwrap();
    store.store(&sample_record("trt13", 2, 2020)).await.unwrap();

    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn memory_store_get_missing_is_none() {
    let store = MemoryRecordStore::new("agency_monthly_info");
    let missing = store.get(&RecordKey::new("trt13", 1, 2020)).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn failing_memory_store_counts_the_attempt() {
    let store = MemoryRecordStore::failing("broken", "agency_monthly_info");
    let err = store.store(&sample_record("trt13", 1, 2020)).await.unwrap_err();

    assert!(matches!(err, StorageError::Backend(_)));
    assert_eq!(store.store_calls(), 1);
    assert!(store.is_empty());
}

// ===========================================================================
// RecordStore contract tests (SurrealDB in-memory)
// ===========================================================================

#[tokio::test]
async fn surreal_store_get_round_trip() {
    let store = SurrealRecordStore::in_memory("agency_monthly_info")
        .await
        .unwrap();
    let record = failed_record("trt13", 1, 2020);
    store.store(&record).await.unwrap();

    let fetched = store.get(&record.key()).await.unwrap().unwrap();
    assert_eq!(fetched.agency_id, "trt13");
    assert_eq!(fetched.crawl_timestamp, record.crawl_timestamp);
    assert_eq!(fetched.proc_info, record.proc_info);
    assert_eq!(fetched.package, record.package);
    assert_eq!(fetched.backups, record.backups);
    assert_eq!(fetched.exec_duration.as_millis(), 1200);
}

#[tokio::test]
async fn surreal_store_upserts_same_key() {
    let store = SurrealRecordStore::in_memory("agency_monthly_info")
        .await
        .unwrap();
    let record = failed_record("trt13", 1, 2020);
    store.store(&record).await.unwrap();
    store.store(&record).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn surreal_store_replaces_previous_outcome() {
    let store = SurrealRecordStore::in_memory("agency_monthly_info")
        .await
        .unwrap();
    store.store(&failed_record("trt13", 1, 2020)).await.unwrap();
    store.store(&sample_record("trt13", 1, 2020)).await.unwrap();

    let fetched = store
        .get(&RecordKey::new("trt13", 1, 2020))
        .await
        .unwrap()
        .unwrap();
    assert!(fetched.proc_info.is_none());
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn surreal_store_rejects_unsafe_collection() {
    let err = SurrealRecordStore::in_memory("mi; REMOVE TABLE mi")
        .await
        .err()
        .expect("unsafe collection must be rejected");
    assert!(matches!(err, StorageError::InvalidCollection { .. }));
}

// ===========================================================================
// ObjectStore contract tests
// ===========================================================================

#[tokio::test]
async fn memory_object_store_backup_is_one_descriptor_per_file() {
    let store = MemoryObjectStore::new();
    let paths = vec![PathBuf::from("/out/2.html"), PathBuf::from("/out/1.html")];

    let descriptors = store.backup(&paths, "TRT13").await.unwrap();

    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].url, "mem://trt13/2.html");
    assert_eq!(descriptors[1].url, "mem://trt13/1.html");
    assert_eq!(store.backup_calls(), 1);
    assert_eq!(store.upload_calls(), 0);
}

#[tokio::test]
async fn failing_object_store_rejects_uploads() {
    let store = MemoryObjectStore::failing();
    let err = store
        .upload_file(&PathBuf::from("/out/pkg.zip"), "trt13")
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Upload { .. }));
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn fs_object_store_descriptor_matches_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path().join("blobs")).unwrap();
    let src = dir.path().join("pkg.zip");
    std::fs::write(&src, b"hello world").unwrap();

    let d = store.upload_file(&src, "trt13").await.unwrap();

    assert_eq!(d, BackupDescriptor::for_bytes(d.url.clone(), b"hello world"));
}
