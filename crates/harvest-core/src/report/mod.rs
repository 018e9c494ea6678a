//! Execution report: the envelope produced by the collector/executor.
//!
//! A report carries up to four stage results (setup, build, run, teardown),
//! an optional package path and an optional list of raw per-period files.
//! It is decoded once from stdin and never mutated.

mod proto;

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{IngestError, Result};

pub use proto::{
    ExecutionReportMessage, StageResultMessage, StageStatusMessage, StepExecutionMessage,
    TimestampMessage,
};

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Ok,
    SetupError,
    BuildError,
    RunError,
    TeardownError,
}

impl StageStatus {
    pub fn is_error(self) -> bool {
        !matches!(self, StageStatus::Ok)
    }
}

/// Pipeline stages, in iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Setup,
    Build,
    Run,
    Teardown,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Setup, Stage::Build, Stage::Run, Stage::Teardown];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Build => "build",
            Stage::Run => "run",
            Stage::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One executed step: command, captured stdio, exit status and timing.
///
/// Timestamps are kept as RFC 3339 strings; they are only interpreted by the
/// status reducer, which treats anything unparsable as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepExecution {
    pub cmd: String,
    pub cmd_dir: String,
    pub stdin: String,
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
    #[serde(deserialize_with = "null_as_empty")]
    pub env: Vec<String>,
    pub start_time: Option<String>,
    pub finish_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageResult {
    pub status: StageStatus,
    #[serde(default)]
    pub exec: StepExecution,
}

/// Decoded execution report.
///
/// Unknown keys are rejected, so an envelope of some other shape never
/// decodes as an empty report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionReport {
    #[serde(default)]
    pub setup: Option<StageResult>,
    #[serde(default)]
    pub build: Option<StageResult>,
    #[serde(default)]
    pub run: Option<StageResult>,
    #[serde(default)]
    pub teardown: Option<StageResult>,
    /// Path of the packaged output, empty when nothing was packaged.
    #[serde(default)]
    pub package: Option<String>,
    /// Raw files produced by the crawler.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<String>,
    /// When the crawl happened (RFC 3339).
    #[serde(default)]
    pub crawl_timestamp: Option<String>,
}

/// Producers send `null` for an unset list.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExecutionReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        match stage {
            Stage::Setup => self.setup.as_ref(),
            Stage::Build => self.build.as_ref(),
            Stage::Run => self.run.as_ref(),
            Stage::Teardown => self.teardown.as_ref(),
        }
    }

    /// Present stages in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (Stage, &StageResult)> + '_ {
        Stage::ALL
            .into_iter()
            .filter_map(move |stage| self.stage(stage).map(|result| (stage, result)))
    }

    /// Package path, if one was produced.
    pub fn package_path(&self) -> Option<&Path> {
        self.package
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Path::new)
    }

    /// Raw file paths, skipping blank entries.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Crawl timestamp, when present and well-formed.
    pub fn crawl_time(&self) -> Option<DateTime<Utc>> {
        self.crawl_timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Wire format of the report on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    /// Protocol-buffer binary message.
    Proto,
    /// Protocol-buffer message prefixed with its varint length.
    ProtoDelimited,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "proto" | "protobuf" => Ok(ReportFormat::Proto),
            "proto-delimited" | "delimited" => Ok(ReportFormat::ProtoDelimited),
            other => Err(format!(
                "unknown report format '{other}' (expected json, proto or proto-delimited)"
            )),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Json => "json",
            ReportFormat::Proto => "proto",
            ReportFormat::ProtoDelimited => "proto-delimited",
        })
    }
}

/// Decode a complete report. Nothing is accepted unless the whole input
/// conforms.
pub fn decode_report(bytes: &[u8], format: ReportFormat) -> Result<ExecutionReport> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::Decode("empty input".to_string()));
    }

    match format {
        ReportFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| IngestError::Decode(e.to_string()))
        }
        ReportFormat::Proto => proto::decode(bytes),
        ReportFormat::ProtoDelimited => proto::decode_delimited(bytes),
    }
}

/// Read `reader` to the end and decode it.
pub fn read_report(mut reader: impl Read, format: ReportFormat) -> Result<ExecutionReport> {
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| IngestError::Decode(e.to_string()))?;
    decode_report(&buf, format)
}
