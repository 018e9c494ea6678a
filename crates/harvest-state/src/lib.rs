//! Harvest-State: storage backends for harvest-sink
//!
//! This crate provides the persistence layer for the collection pipeline's
//! terminal stage. It owns the canonical record shape and every backend the
//! ingest core can write to.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: upsert semantics, artifact upload, backend connection setup.
//!
//! ## Key Components
//!
//! - `AgencyMonthlyInfo`: the canonical record, keyed by `RecordKey`
//! - `RecordStore`: SurrealDB (document) and Postgres (relational) stores
//! - `ObjectStore`: Swift and filesystem artifact stores

mod error;
pub mod fakes;
mod fs_store;
mod postgres_store;
mod record;
pub mod storage_traits;
mod surreal_store;
mod swift;

pub use error::StorageError;
pub use fs_store::FsObjectStore;
pub use postgres_store::{PostgresConfig, PostgresRecordStore};
pub use record::{AgencyMonthlyInfo, BackupDescriptor, ExecDuration, ProcInfo, RecordKey};
pub use storage_traits::{ObjectStore, RecordStore, StorageResult};
pub use surreal_store::{SurrealConfig, SurrealRecordStore};
pub use swift::{SwiftConfig, SwiftObjectStore};
