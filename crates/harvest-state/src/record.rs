//! Canonical record persisted for every collection run.
//!
//! `AgencyMonthlyInfo` is the unit every record store upserts. It is keyed by
//! [`RecordKey`] (agency, month, year); storing the same key twice replaces
//! the earlier row.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Snapshot of the process invocation that failed (or terminated) a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcInfo {
    pub cmd: String,
    pub cmd_dir: String,
    pub stdin: String,
    pub stdout: String,
    pub stderr: String,
    /// Process exit status.
    pub status: i32,
    /// Environment as `KEY=VALUE` entries.
    pub env: Vec<String>,
}

/// Reference to an artifact persisted in an object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    /// Location of the blob.
    pub url: String,
    /// SHA-256 hex digest of the uploaded bytes.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
}

impl BackupDescriptor {
    /// Describe `data` stored at `url`.
    pub fn for_bytes(url: impl Into<String>, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self {
            url: url.into(),
            hash: hex::encode(hasher.finalize()),
            size: data.len() as u64,
        }
    }
}

/// Execution duration, tagged with the unit it was measured in.
///
/// Stage timings are millisecond spans; a wall-clock duration measured from an
/// externally supplied start is in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum ExecDuration {
    Millis(u64),
    Seconds(f64),
}

impl ExecDuration {
    pub fn zero() -> Self {
        ExecDuration::Millis(0)
    }

    /// Duration expressed in milliseconds.
    pub fn as_millis(&self) -> u64 {
        match *self {
            ExecDuration::Millis(ms) => ms,
            ExecDuration::Seconds(s) => (s * 1000.0).round() as u64,
        }
    }
}

impl Default for ExecDuration {
    fn default() -> Self {
        Self::zero()
    }
}

/// Upsert key shared by all record stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub agency_id: String,
    pub month: u32,
    pub year: u32,
}

impl RecordKey {
    pub fn new(agency_id: impl AsRef<str>, month: u32, year: u32) -> Self {
        Self {
            agency_id: agency_id.as_ref().to_lowercase(),
            month,
            year,
        }
    }

    /// Stable string id, e.g. `trt13-2020-01`.
    pub fn id(&self) -> String {
        format!("{}-{:04}-{:02}", self.agency_id, self.year, self.month)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Agency monthly info: the normalized outcome of one collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencyMonthlyInfo {
    /// Always lower case.
    pub agency_id: String,
    pub month: u32,
    pub year: u32,
    pub crawl_timestamp: DateTime<Utc>,
    pub proc_info: Option<ProcInfo>,
    pub exec_duration: ExecDuration,
    pub package: Option<BackupDescriptor>,
    pub backups: Option<Vec<BackupDescriptor>>,
}

impl AgencyMonthlyInfo {
    /// Create a record with no process info, zero duration and no artifacts.
    pub fn new(
        agency_id: impl AsRef<str>,
        month: u32,
        year: u32,
        crawl_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            agency_id: agency_id.as_ref().to_lowercase(),
            month,
            year,
            crawl_timestamp,
            proc_info: None,
            exec_duration: ExecDuration::zero(),
            package: None,
            backups: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.agency_id, self.month, self.year)
    }
}
