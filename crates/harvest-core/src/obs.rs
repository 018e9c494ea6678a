//! Structured observability hooks for the ingest lifecycle.
//!
//! This module provides:
//! - An ingest-scoped span (`IngestSpan`) tagged with a generated ingest id
//! - Emission functions for lifecycle events: start, upload, routing, store, failure
//!
//! Events are emitted at `info!` level. Failures go out at `debug!`; the
//! binary prints the one user-facing error line itself.

use tracing::{debug, info, Span};
use uuid::Uuid;

use harvest_state::RecordKey;

/// Span covering one ingest invocation.
///
/// The span is attached to the pipeline future with
/// [`tracing::Instrument`], so it is never held across an await.
pub struct IngestSpan {
    ingest_id: Uuid,
    span: Span,
}

impl IngestSpan {
    pub fn new(key: &RecordKey) -> Self {
        let ingest_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "harvest.ingest",
            ingest_id = %ingest_id,
            agency_id = %key.agency_id,
            month = key.month,
            year = key.year,
        );
        Self { ingest_id, span }
    }

    pub fn ingest_id(&self) -> Uuid {
        self.ingest_id
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

/// Emit event: ingest started.
pub fn emit_ingest_started(format: &str, policy: &str) {
    info!(event = "ingest.started", format = %format, policy = %policy);
}

/// Emit event: one artifact uploaded.
pub fn emit_artifact_uploaded(kind: &str, url: &str, size: u64) {
    info!(event = "artifact.uploaded", kind = %kind, url = %url, size = size);
}

/// Emit event: record routed to a collection.
pub fn emit_record_routed(status: Option<i32>, collection: &str) {
    info!(event = "record.routed", status = ?status, collection = %collection);
}

/// Emit event: record accepted by one backend.
pub fn emit_record_stored(backend: &str, collection: &str) {
    info!(event = "record.stored", backend = %backend, collection = %collection);
}

/// Emit event: ingest finished successfully.
pub fn emit_ingest_finished(collection: &str, stored: usize, duration_ms: u64) {
    info!(
        event = "ingest.finished",
        collection = %collection,
        stored = stored,
        duration_ms = duration_ms,
    );
}

/// Emit event: ingest failed (debug level).
pub fn emit_ingest_failed(exit_code: i32, error: &dyn std::fmt::Display) {
    debug!(event = "ingest.failed", exit_code = exit_code, error = %error);
}
