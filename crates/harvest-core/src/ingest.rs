//! The ingest pipeline: one report in, one record stored.
//!
//! Order: validate settings, decode, reduce, route, build backends, upload
//! artifacts, dispatch. A failure at any step ends the run; nothing after it
//! is attempted.

use std::io::Read;
use std::time::Instant;

use chrono::{DateTime, Utc};
use harvest_state::storage_traits::validate_collection;
use harvest_state::{AgencyMonthlyInfo, RecordKey};
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::backends::BackendFactory;
use crate::classify::classify_artifacts;
use crate::dispatch::{DispatchPolicy, Dispatcher};
use crate::error::{IngestError, Result};
use crate::obs::{self, IngestSpan};
use crate::reduce::reduce_status;
use crate::report::{read_report, ReportFormat};
use crate::router::CollectionRouter;

/// Per-invocation settings. Read once, never mutated.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub agency_id: String,
    pub month: u32,
    pub year: u32,
    pub format: ReportFormat,
    /// External start timestamp (RFC 3339 or unix seconds).
    pub start_time: Option<String>,
    pub router: CollectionRouter,
    pub policy: DispatchPolicy,
}

impl IngestSettings {
    pub fn new(agency_id: impl Into<String>, month: u32, year: u32, router: CollectionRouter) -> Self {
        Self {
            agency_id: agency_id.into(),
            month,
            year,
            format: ReportFormat::default(),
            start_time: None,
            router,
            policy: DispatchPolicy::default(),
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_start_time(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check required values before anything is read or connected.
    pub fn validate(&self) -> Result<()> {
        if self.agency_id.trim().is_empty() {
            return Err(IngestError::Config("AID must not be empty".to_string()));
        }
        if !(1..=12).contains(&self.month) {
            return Err(IngestError::Config(format!(
                "MONTH must be in 1..=12, got {}",
                self.month
            )));
        }
        if self.year == 0 {
            return Err(IngestError::Config("YEAR must be positive".to_string()));
        }
        if self.router.success_codes().is_empty() {
            return Err(IngestError::Config(
                "SUCC_CODES must list at least one code".to_string(),
            ));
        }
        for collection in [
            self.router.success_collection(),
            self.router.error_collection(),
        ] {
            validate_collection(collection).map_err(|e| IngestError::Config(e.to_string()))?;
        }
        Ok(())
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.agency_id.trim(), self.month, self.year)
    }
}

/// What a successful ingest wrote.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub ingest_id: Uuid,
    pub record: AgencyMonthlyInfo,
    pub collection: String,
    /// Backends that accepted the record, in dispatch order.
    pub stored: Vec<String>,
}

/// Run the pipeline against `input`, timestamped now.
pub async fn ingest(
    input: impl Read,
    settings: &IngestSettings,
    factory: &dyn BackendFactory,
) -> Result<IngestOutcome> {
    ingest_at(input, settings, factory, Utc::now()).await
}

/// Run the pipeline with an explicit clock.
pub async fn ingest_at(
    input: impl Read,
    settings: &IngestSettings,
    factory: &dyn BackendFactory,
    now: DateTime<Utc>,
) -> Result<IngestOutcome> {
    settings.validate()?;

    let span = IngestSpan::new(&settings.key());
    let ingest_id = span.ingest_id();
    let started = Instant::now();

    let result = run(input, settings, factory, now, ingest_id)
        .instrument(span.span())
        .await;

    match &result {
        Ok(outcome) => obs::emit_ingest_finished(
            &outcome.collection,
            outcome.stored.len(),
            started.elapsed().as_millis() as u64,
        ),
        Err(e) => obs::emit_ingest_failed(e.exit_code(), e),
    }
    result
}

async fn run(
    input: impl Read,
    settings: &IngestSettings,
    factory: &dyn BackendFactory,
    now: DateTime<Utc>,
    ingest_id: Uuid,
) -> Result<IngestOutcome> {
    obs::emit_ingest_started(
        &settings.format.to_string(),
        &settings.policy.to_string(),
    );

    let report = read_report(input, settings.format)?;
    let reduction = reduce_status(&report, settings.start_time.as_deref(), now);
    if let Some(stage) = reduction.failed_stage {
        debug!(stage = %stage, "Failing stage captured");
    }

    let collection = settings.router.route(reduction.terminal_status).to_string();
    obs::emit_record_routed(reduction.terminal_status, &collection);

    let backends = factory.build(&collection).await?;

    let key = settings.key();
    let mut record = AgencyMonthlyInfo::new(
        &key.agency_id,
        key.month,
        key.year,
        report.crawl_time().unwrap_or(now),
    );
    record.proc_info = reduction.proc_info;
    record.exec_duration = reduction.exec_duration;

    let artifacts =
        classify_artifacts(&report, &record.agency_id, backends.objects.as_ref()).await?;
    artifacts.attach_to(&mut record);

    let dispatched = Dispatcher::new(backends.stores, settings.policy)
        .dispatch(&record)
        .await?;

    Ok(IngestOutcome {
        ingest_id,
        record,
        collection,
        stored: dispatched.stored,
    })
}
