//! Protocol-buffer wire shape of the execution report.
//!
//! Field numbers are stable; new fields must take fresh tags.

use chrono::{DateTime, SecondsFormat};
use prost::Message;

use super::{ExecutionReport, StageResult, StageStatus, StepExecution};
use crate::error::{IngestError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StageStatusMessage {
    Ok = 0,
    SetupError = 1,
    BuildError = 2,
    RunError = 3,
    TeardownError = 4,
}

impl From<StageStatusMessage> for StageStatus {
    fn from(status: StageStatusMessage) -> Self {
        match status {
            StageStatusMessage::Ok => StageStatus::Ok,
            StageStatusMessage::SetupError => StageStatus::SetupError,
            StageStatusMessage::BuildError => StageStatus::BuildError,
            StageStatusMessage::RunError => StageStatus::RunError,
            StageStatusMessage::TeardownError => StageStatus::TeardownError,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TimestampMessage {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct StepExecutionMessage {
    #[prost(string, tag = "1")]
    pub cmd: String,
    #[prost(string, tag = "2")]
    pub cmd_dir: String,
    #[prost(string, tag = "3")]
    pub stdin: String,
    #[prost(string, tag = "4")]
    pub stdout: String,
    #[prost(string, tag = "5")]
    pub stderr: String,
    #[prost(int32, tag = "6")]
    pub status: i32,
    #[prost(string, repeated, tag = "7")]
    pub env: Vec<String>,
    #[prost(message, optional, tag = "8")]
    pub start_time: Option<TimestampMessage>,
    #[prost(message, optional, tag = "9")]
    pub finish_time: Option<TimestampMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StageResultMessage {
    #[prost(enumeration = "StageStatusMessage", tag = "1")]
    pub status: i32,
    #[prost(message, optional, tag = "2")]
    pub exec: Option<StepExecutionMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ExecutionReportMessage {
    #[prost(message, optional, tag = "1")]
    pub setup: Option<StageResultMessage>,
    #[prost(message, optional, tag = "2")]
    pub build: Option<StageResultMessage>,
    #[prost(message, optional, tag = "3")]
    pub run: Option<StageResultMessage>,
    #[prost(message, optional, tag = "4")]
    pub teardown: Option<StageResultMessage>,
    #[prost(string, tag = "5")]
    pub package: String,
    #[prost(string, repeated, tag = "6")]
    pub files: Vec<String>,
    #[prost(message, optional, tag = "7")]
    pub crawl_timestamp: Option<TimestampMessage>,
}

/// Out-of-range timestamps are treated as absent.
fn timestamp_to_rfc3339(ts: Option<TimestampMessage>) -> Option<String> {
    let ts = ts?;
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

impl From<StepExecutionMessage> for StepExecution {
    fn from(m: StepExecutionMessage) -> Self {
        Self {
            cmd: m.cmd,
            cmd_dir: m.cmd_dir,
            stdin: m.stdin,
            stdout: m.stdout,
            stderr: m.stderr,
            status: m.status,
            env: m.env,
            start_time: timestamp_to_rfc3339(m.start_time),
            finish_time: timestamp_to_rfc3339(m.finish_time),
        }
    }
}

impl TryFrom<StageResultMessage> for StageResult {
    type Error = IngestError;

    fn try_from(m: StageResultMessage) -> Result<Self> {
        let status = StageStatusMessage::try_from(m.status)
            .map_err(|e| IngestError::Decode(format!("stage status: {e}")))?;
        Ok(Self {
            status: status.into(),
            exec: m.exec.map(StepExecution::from).unwrap_or_default(),
        })
    }
}

fn stage(m: Option<StageResultMessage>) -> Result<Option<StageResult>> {
    m.map(StageResult::try_from).transpose()
}

impl TryFrom<ExecutionReportMessage> for ExecutionReport {
    type Error = IngestError;

    fn try_from(m: ExecutionReportMessage) -> Result<Self> {
        Ok(Self {
            setup: stage(m.setup)?,
            build: stage(m.build)?,
            run: stage(m.run)?,
            teardown: stage(m.teardown)?,
            package: Some(m.package).filter(|p| !p.is_empty()),
            files: m.files,
            crawl_timestamp: timestamp_to_rfc3339(m.crawl_timestamp),
        })
    }
}

pub(super) fn decode(bytes: &[u8]) -> Result<ExecutionReport> {
    let message =
        ExecutionReportMessage::decode(bytes).map_err(|e| IngestError::Decode(e.to_string()))?;
    ExecutionReport::try_from(message)
}

pub(super) fn decode_delimited(bytes: &[u8]) -> Result<ExecutionReport> {
    let mut buf = bytes;
    let len = prost::decode_length_delimiter(&mut buf)
        .map_err(|e| IngestError::Decode(e.to_string()))?;
    if buf.len() != len {
        return Err(IngestError::Decode(format!(
            "length prefix says {len} bytes, found {}",
            buf.len()
        )));
    }
    decode(buf)
}
