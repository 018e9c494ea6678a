//! Status reduction: many stage results in, one process snapshot out.
//!
//! Also home to the small pure helpers shared by the pipeline (timestamp
//! parsing, success-code membership).

use chrono::{DateTime, Utc};
use harvest_state::{ExecDuration, ProcInfo};

use crate::report::{ExecutionReport, Stage, StepExecution};

/// Result of reducing an execution report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReduction {
    /// Execution fields of the last failing stage, if any stage failed.
    pub proc_info: Option<ProcInfo>,
    pub exec_duration: ExecDuration,
    /// Exit status used for routing.
    pub terminal_status: Option<i32>,
    /// Stage whose execution populated `proc_info`.
    pub failed_stage: Option<Stage>,
}

/// Copy the process-level fields of a step execution.
pub fn proc_info_from(exec: &StepExecution) -> ProcInfo {
    ProcInfo {
        cmd: exec.cmd.clone(),
        cmd_dir: exec.cmd_dir.clone(),
        stdin: exec.stdin.clone(),
        stdout: exec.stdout.clone(),
        stderr: exec.stderr.clone(),
        status: exec.status,
        env: exec.env.clone(),
    }
}

/// Parse an RFC 3339 timestamp or integral unix seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Exact membership of `status` in `success_codes`.
pub fn is_success_code(status: i32, success_codes: &[i32]) -> bool {
    success_codes.contains(&status)
}

fn stage_millis(exec: &StepExecution) -> u64 {
    let start = exec.start_time.as_deref().and_then(parse_timestamp);
    let finish = exec.finish_time.as_deref().and_then(parse_timestamp);
    match (start, finish) {
        (Some(start), Some(finish)) => (finish - start).num_milliseconds().max(0) as u64,
        _ => 0,
    }
}

fn seconds_since(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - start).num_milliseconds().max(0) as f64) / 1000.0
}

/// Reduce the stages of `report` to one process snapshot and duration.
///
/// Stages are visited in pipeline order and every failing stage overwrites
/// the previous one, so the last failure wins. With no failure the duration
/// is measured from `start_time` to `now` in seconds, or zero when no usable
/// start was supplied.
pub fn reduce_status(
    report: &ExecutionReport,
    start_time: Option<&str>,
    now: DateTime<Utc>,
) -> StatusReduction {
    let mut proc_info = None;
    let mut failed_stage = None;
    let mut exec_duration = ExecDuration::zero();
    let mut last_status = None;

    for (stage, result) in report.stages() {
        last_status = Some(result.exec.status);
        if result.status.is_error() {
            proc_info = Some(proc_info_from(&result.exec));
            failed_stage = Some(stage);
            exec_duration = ExecDuration::Millis(stage_millis(&result.exec));
        }
    }

    if proc_info.is_none() {
        if let Some(start) = start_time.and_then(parse_timestamp) {
            exec_duration = ExecDuration::Seconds(seconds_since(start, now));
        }
    }

    let terminal_status = proc_info.as_ref().map(|p| p.status).or(last_status);

    StatusReduction {
        proc_info,
        exec_duration,
        terminal_status,
        failed_stage,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::report::{StageResult, StageStatus};

    fn stage(status: StageStatus, cmd: &str, code: i32) -> Option<StageResult> {
        Some(StageResult {
            status,
            exec: StepExecution {
                cmd: cmd.to_string(),
                status: code,
                start_time: Some("2020-02-01T10:00:00Z".to_string()),
                finish_time: Some("2020-02-01T10:00:01.250Z".to_string()),
                ..StepExecution::default()
            },
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 2, 1, 10, 0, 30).unwrap()
    }

    #[test]
    fn no_failures_leaves_proc_info_unset() {
        let report = ExecutionReport {
            setup: stage(StageStatus::Ok, "s", 0),
            run: stage(StageStatus::Ok, "r", 0),
            ..ExecutionReport::default()
        };

        let r = reduce_status(&report, None, now());
        assert!(r.proc_info.is_none());
        assert!(r.failed_stage.is_none());
        assert_eq!(r.exec_duration, ExecDuration::zero());
        assert_eq!(r.terminal_status, Some(0));
    }

    #[test]
    fn no_failures_measures_from_start_time() {
        let report = ExecutionReport {
            run: stage(StageStatus::Ok, "r", 0),
            ..ExecutionReport::default()
        };

        let rfc = reduce_status(&report, Some("2020-02-01T10:00:00Z"), now());
        assert_eq!(rfc.exec_duration, ExecDuration::Seconds(30.0));

        let unix = reduce_status(&report, Some("1580551200"), now());
        assert_eq!(unix.exec_duration, ExecDuration::Seconds(30.0));
    }

    #[test]
    fn start_time_in_the_future_clamps_to_zero() {
        let r = reduce_status(
            &ExecutionReport::default(),
            Some("2030-01-01T00:00:00Z"),
            now(),
        );
        assert_eq!(r.exec_duration, ExecDuration::Seconds(0.0));
    }

    #[test]
    fn single_failure_is_captured() {
        let mut run = stage(StageStatus::RunError, "python3 crawler.py", 1);
        if let Some(s) = run.as_mut() {
            s.exec.cmd_dir = "/crawler".to_string();
            s.exec.stdin = "{}".to_string();
            s.exec.stdout = "fetched 3 pages".to_string();
            s.exec.stderr = "Traceback".to_string();
            s.exec.env = vec!["MONTH=1".to_string(), "YEAR=2020".to_string()];
        }
        let report = ExecutionReport {
            setup: stage(StageStatus::Ok, "s", 0),
            run,
            ..ExecutionReport::default()
        };

        let r = reduce_status(&report, Some("2020-02-01T09:00:00Z"), now());
        assert_eq!(
            r.proc_info,
            Some(ProcInfo {
                cmd: "python3 crawler.py".to_string(),
                cmd_dir: "/crawler".to_string(),
                stdin: "{}".to_string(),
                stdout: "fetched 3 pages".to_string(),
                stderr: "Traceback".to_string(),
                status: 1,
                env: vec!["MONTH=1".to_string(), "YEAR=2020".to_string()],
            })
        );
        assert_eq!(r.failed_stage, Some(Stage::Run));
        assert_eq!(r.exec_duration, ExecDuration::Millis(1250));
        assert_eq!(r.terminal_status, Some(1));
    }

    #[test]
    fn last_failing_stage_wins() {
        let report = ExecutionReport {
            setup: stage(StageStatus::Ok, "s", 0),
            build: stage(StageStatus::BuildError, "b", 2),
            run: stage(StageStatus::RunError, "r", 3),
            ..ExecutionReport::default()
        };

        let r = reduce_status(&report, None, now());
        assert_eq!(r.proc_info.unwrap().cmd, "r");
        assert_eq!(r.failed_stage, Some(Stage::Run));
        assert_eq!(r.terminal_status, Some(3));
    }

    #[test]
    fn failure_status_routes_even_when_later_stage_ok() {
        let report = ExecutionReport {
            build: stage(StageStatus::BuildError, "b", 2),
            teardown: stage(StageStatus::Ok, "t", 0),
            ..ExecutionReport::default()
        };

        let r = reduce_status(&report, None, now());
        assert_eq!(r.terminal_status, Some(2));
    }

    #[test]
    fn malformed_or_inverted_timing_gives_zero() {
        let mut bad = stage(StageStatus::RunError, "r", 1);
        if let Some(s) = bad.as_mut() {
            s.exec.finish_time = Some("yesterday".to_string());
        }
        let report = ExecutionReport {
            run: bad,
            ..ExecutionReport::default()
        };
        assert_eq!(
            reduce_status(&report, None, now()).exec_duration,
            ExecDuration::Millis(0)
        );

        let mut inverted = stage(StageStatus::RunError, "r", 1);
        if let Some(s) = inverted.as_mut() {
            s.exec.finish_time = Some("2020-02-01T09:59:00Z".to_string());
        }
        let report = ExecutionReport {
            run: inverted,
            ..ExecutionReport::default()
        };
        assert_eq!(
            reduce_status(&report, None, now()).exec_duration,
            ExecDuration::Millis(0)
        );
    }

    #[test]
    fn empty_report_has_no_terminal_status() {
        let r = reduce_status(&ExecutionReport::default(), None, now());
        assert_eq!(r.terminal_status, None);
        assert!(r.proc_info.is_none());
    }

    #[test]
    fn success_code_membership_is_exact() {
        assert!(is_success_code(0, &[0]));
        assert!(!is_success_code(1, &[0]));
        assert!(is_success_code(4, &[0, 4]));
        assert!(!is_success_code(0, &[]));
    }

    #[test]
    fn parse_timestamp_accepts_both_forms() {
        assert!(parse_timestamp("2020-02-01T10:00:00+02:00").is_some());
        assert!(parse_timestamp("1580551200").is_some());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("soon").is_none());
    }
}
