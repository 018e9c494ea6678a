//! Harvest Core Library
//!
//! Turns an execution report into an `AgencyMonthlyInfo` record and stores
//! it in every configured backend.

pub mod backends;
pub mod classify;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod obs;
pub mod reduce;
pub mod report;
pub mod router;
pub mod telemetry;

pub use backends::{BackendFactory, Backends, ConfiguredBackends, DatabaseBackend, ObjectBackend};
pub use classify::{classify_artifacts, Artifacts};
pub use dispatch::{BackendFailure, DispatchError, DispatchPolicy, DispatchReport, Dispatcher};
pub use error::{IngestError, Result, EXIT_CLIENT, EXIT_CONFIG, EXIT_PROCESSING};
pub use ingest::{ingest, ingest_at, IngestOutcome, IngestSettings};
pub use reduce::{is_success_code, parse_timestamp, proc_info_from, reduce_status, StatusReduction};
pub use report::{
    decode_report, read_report, ExecutionReport, ReportFormat, Stage, StageResult, StageStatus,
    StepExecution,
};
pub use router::CollectionRouter;
pub use telemetry::init_tracing;
