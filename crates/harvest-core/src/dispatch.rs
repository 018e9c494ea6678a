//! Fan a finished record out to every configured record store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use harvest_state::{AgencyMonthlyInfo, RecordStore, StorageError};
use thiserror::Error;
use tracing::{error, instrument};

use crate::obs;

/// What to do when one of several record stores fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Store in declared order and stop at the first failure.
    #[default]
    FailFast,
    /// Attempt every store and report all failures together.
    AttemptAll,
}

impl FromStr for DispatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail-fast" | "fail_fast" => Ok(DispatchPolicy::FailFast),
            "attempt-all" | "attempt_all" => Ok(DispatchPolicy::AttemptAll),
            other => Err(format!(
                "unknown dispatch policy '{other}' (expected fail-fast or attempt-all)"
            )),
        }
    }
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchPolicy::FailFast => "fail-fast",
            DispatchPolicy::AttemptAll => "attempt-all",
        })
    }
}

/// A store that rejected the record.
#[derive(Debug)]
pub struct BackendFailure {
    pub backend: String,
    pub source: StorageError,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.source)
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no record store configured")]
    NoStores,

    #[error("{backend} failed: {source}")]
    Failed {
        backend: String,
        #[source]
        source: StorageError,
        /// Stores that succeeded before the failure.
        stored: Vec<String>,
    },

    #[error("{}", summary(.failures, .stored))]
    Partial {
        failures: Vec<BackendFailure>,
        stored: Vec<String>,
    },
}

fn summary(failures: &[BackendFailure], stored: &[String]) -> String {
    let detail = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "{} of {} stores failed: {detail}",
        failures.len(),
        failures.len() + stored.len()
    )
}

/// Stores that accepted the record, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub stored: Vec<String>,
}

/// Ordered set of record stores plus the failure policy.
pub struct Dispatcher {
    stores: Vec<Arc<dyn RecordStore>>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(stores: Vec<Arc<dyn RecordStore>>, policy: DispatchPolicy) -> Self {
        Self { stores, policy }
    }

    /// Store `record` in every backend.
    #[instrument(skip_all, fields(key = %record.key(), policy = %self.policy, stores = self.stores.len()))]
    pub async fn dispatch(
        &self,
        record: &AgencyMonthlyInfo,
    ) -> Result<DispatchReport, DispatchError> {
        if self.stores.is_empty() {
            return Err(DispatchError::NoStores);
        }

        let mut stored = Vec::with_capacity(self.stores.len());
        let mut failures = Vec::new();

        for store in &self.stores {
            let backend = store.name().to_string();
            match store.store(record).await {
                Ok(()) => {
                    obs::emit_record_stored(&backend, store.collection());
                    stored.push(backend);
                }
                Err(source) => {
                    error!(backend = %backend, error = %source, "Record store failed");
                    if self.policy == DispatchPolicy::FailFast {
                        return Err(DispatchError::Failed {
                            backend,
                            source,
                            stored,
                        });
                    }
                    failures.push(BackendFailure { backend, source });
                }
            }
        }

        if failures.is_empty() {
            Ok(DispatchReport { stored })
        } else {
            Err(DispatchError::Partial { failures, stored })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use harvest_state::fakes::MemoryRecordStore;

    use super::*;

    fn record() -> AgencyMonthlyInfo {
        AgencyMonthlyInfo::new("trt13", 1, 2020, Utc::now())
    }

    fn stores(fakes: &[&Arc<MemoryRecordStore>]) -> Vec<Arc<dyn RecordStore>> {
        fakes
            .iter()
            .map(|s| Arc::clone(*s) as Arc<dyn RecordStore>)
            .collect()
    }

    #[tokio::test]
    async fn stores_in_every_backend() {
        let a = Arc::new(MemoryRecordStore::named("a", "mi"));
        let b = Arc::new(MemoryRecordStore::named("b", "mi"));
        let d = Dispatcher::new(stores(&[&a, &b]), DispatchPolicy::FailFast);

        let report = d.dispatch(&record()).await.unwrap();

        assert_eq!(report.stored, ["a", "b"]);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn fail_fast_skips_remaining_backends() {
        let a = Arc::new(MemoryRecordStore::failing("a", "mi"));
        let b = Arc::new(MemoryRecordStore::named("b", "mi"));
        let d = Dispatcher::new(stores(&[&a, &b]), DispatchPolicy::FailFast);

        let err = d.dispatch(&record()).await.unwrap_err();

        match err {
            DispatchError::Failed {
                backend, stored, ..
            } => {
                assert_eq!(backend, "a");
                assert!(stored.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(b.store_calls(), 0);
    }

    #[tokio::test]
    async fn attempt_all_collects_every_failure() {
        let a = Arc::new(MemoryRecordStore::failing("a", "mi"));
        let b = Arc::new(MemoryRecordStore::named("b", "mi"));
        let c = Arc::new(MemoryRecordStore::failing("c", "mi"));
        let d = Dispatcher::new(stores(&[&a, &b, &c]), DispatchPolicy::AttemptAll);

        let err = d.dispatch(&record()).await.unwrap_err();

        assert!(err.to_string().starts_with("2 of 3 stores failed"));
        match err {
            DispatchError::Partial { failures, stored } => {
                let names: Vec<_> = failures.iter().map(|f| f.backend.as_str()).collect();
                assert_eq!(names, ["a", "c"]);
                assert_eq!(stored, ["b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(b.len(), 1);
        assert_eq!(c.store_calls(), 1);
    }

    #[tokio::test]
    async fn empty_dispatcher_is_an_error() {
        let d = Dispatcher::new(Vec::new(), DispatchPolicy::default());
        assert!(matches!(
            d.dispatch(&record()).await,
            Err(DispatchError::NoStores)
        ));
    }

    #[test]
    fn policy_parses_names() {
        assert_eq!(
            "fail-fast".parse::<DispatchPolicy>().unwrap(),
            DispatchPolicy::FailFast
        );
        assert_eq!(
            "ATTEMPT-ALL".parse::<DispatchPolicy>().unwrap(),
            DispatchPolicy::AttemptAll
        );
        assert!("retry".parse::<DispatchPolicy>().is_err());
    }
}
