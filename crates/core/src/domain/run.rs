// JobRun Domain Model (execution record with per-host step timeline)

use crate::domain::error::{DomainError, Result};
use crate::domain::job::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Run ID (UUID v4)
pub type RunId = String;

/// Reserved `results` key carrying an engine-level failure message
pub const SYSTEM_ERROR_KEY: &str = "system_error";

/// Device names that would collide with a reserved `results` key
pub fn is_reserved_host_name(name: &str) -> bool {
    name == SYSTEM_ERROR_KEY
}

/// Fallback host error when a failed step carries no exception text
const SUB_TASK_FAILED: &str = "Sub-task failed";

/// Exception stamped on steps that never ran before their host finished
pub const NOT_EXECUTED: &str = "not executed";

/// Run lifecycle: Pending -> Running -> {Success|Partial|Failed|Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Partial,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Partial | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Reduce per-host outcomes into a terminal run status.
    ///
    /// A run with no hosts at all is Failed.
    pub fn from_counts(success_count: u32, failed_count: u32) -> Self {
        if success_count == 0 && failed_count == 0 {
            RunStatus::Failed
        } else if failed_count == 0 {
            RunStatus::Success
        } else if success_count > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "unknown run status: {}",
                other
            ))),
        }
    }
}

/// What caused a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Manual,
    Auto,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Auto => "auto",
        }
    }
}

impl FromStr for TriggerType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(TriggerType::Manual),
            "auto" => Ok(TriggerType::Auto),
            other => Err(DomainError::ValidationError(format!(
                "unknown trigger type: {}",
                other
            ))),
        }
    }
}

/// Host/step progress: pending -> running -> {success|failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ProgressStatus {
    /// Still pending or running
    pub fn is_active(&self) -> bool {
        matches!(self, ProgressStatus::Pending | ProgressStatus::Running)
    }
}

/// Step output: structured data, or a string rendering of anything that
/// does not serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepValue {
    Text(String),
    Structured(serde_json::Value),
}

impl StepValue {
    /// Coerce any task output into a persistable value.
    ///
    /// Strings stay strings, serializable values become structured JSON,
    /// everything else falls back to its `Debug` rendering.
    pub fn coerce<T>(value: &T) -> Self
    where
        T: Serialize + std::fmt::Debug + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(serde_json::Value::String(s)) => StepValue::Text(s),
            Ok(v) => StepValue::Structured(v),
            Err(_) => StepValue::Text(format!("{:?}", value)),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        StepValue::Text(s.into())
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            StepValue::Structured(v) => Some(v),
            StepValue::Text(_) => None,
        }
    }
}

/// One named step in a host's timeline. `name` is unique within a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub status: ProgressStatus,
    #[serde(default)]
    pub result: Option<StepValue>,
    #[serde(default)]
    pub exception: Option<String>,
}

impl StepResult {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            status: ProgressStatus::Pending,
            result: None,
            exception: None,
        }
    }
}

/// Completion payload of a single step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub succeeded: bool,
    pub value: Option<StepValue>,
    pub exception: Option<String>,
}

impl StepOutcome {
    pub fn success(value: Option<StepValue>) -> Self {
        Self {
            succeeded: true,
            value,
            exception: None,
        }
    }

    pub fn failure(exception: impl Into<String>, value: Option<StepValue>) -> Self {
        Self {
            succeeded: false,
            value,
            exception: Some(exception.into()),
        }
    }
}

/// Per-device progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResult {
    pub success: bool,
    pub status: ProgressStatus,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for HostResult {
    fn default() -> Self {
        Self {
            success: false,
            status: ProgressStatus::Pending,
            steps: Vec::new(),
            error: None,
        }
    }
}

impl HostResult {
    /// Host seeded with the planned step names, all pending
    pub fn pending<S: AsRef<str>>(planned_steps: &[S]) -> Self {
        Self {
            steps: planned_steps
                .iter()
                .map(|s| StepResult::pending(s.as_ref()))
                .collect(),
            ..Self::default()
        }
    }

    fn step_mut(&mut self, name: &str) -> &mut StepResult {
        match self.steps.iter().position(|s| s.name == name) {
            Some(idx) => &mut self.steps[idx],
            None => {
                self.steps.push(StepResult::pending(name));
                let last = self.steps.len() - 1;
                &mut self.steps[last]
            }
        }
    }

    /// Mark `name` running (update in place or append)
    pub fn mark_step_started(&mut self, name: &str) {
        if self.status == ProgressStatus::Pending {
            self.status = ProgressStatus::Running;
        }
        let step = self.step_mut(name);
        step.status = ProgressStatus::Running;
        self.success = self.all_steps_succeeded();
    }

    /// Record the terminal outcome of `name` and re-reduce host success
    pub fn record_step_completed(&mut self, name: &str, outcome: StepOutcome) {
        if self.status == ProgressStatus::Pending {
            self.status = ProgressStatus::Running;
        }

        let failed = !outcome.succeeded;
        let exception = outcome.exception.clone();
        {
            let step = self.step_mut(name);
            step.success = outcome.succeeded;
            step.status = if outcome.succeeded {
                ProgressStatus::Success
            } else {
                ProgressStatus::Failed
            };
            step.result = outcome.value;
            step.exception = outcome.exception;
        }

        self.success = self.all_steps_succeeded();
        if failed {
            self.error = Some(
                exception
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| SUB_TASK_FAILED.to_string()),
            );
        }
    }

    /// Host is done: flip leftover steps to failed, settle terminal status
    pub fn finish(&mut self) {
        for step in self.steps.iter_mut().filter(|s| s.status.is_active()) {
            step.status = ProgressStatus::Failed;
            step.success = false;
            step.exception.get_or_insert_with(|| NOT_EXECUTED.to_string());
        }
        self.success = self.all_steps_succeeded();
        self.status = if self.success {
            ProgressStatus::Success
        } else {
            ProgressStatus::Failed
        };
        if !self.success && self.error.is_none() {
            self.error = Some(SUB_TASK_FAILED.to_string());
        }
    }

    /// Crash path: fail this host (and its unfinished steps) with `message`
    pub fn force_fail(&mut self, message: &str) {
        for step in self.steps.iter_mut().filter(|s| s.status.is_active()) {
            step.status = ProgressStatus::Failed;
            step.success = false;
            step.exception = Some(message.to_string());
        }
        self.success = false;
        self.status = ProgressStatus::Failed;
        self.error.get_or_insert_with(|| message.to_string());
    }

    // Empty step list never counts as success
    fn all_steps_succeeded(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.success)
    }
}

/// `results` mapping of a run: device name -> HostResult, plus an optional
/// engine-level `system_error` string under the same object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    #[serde(
        rename = "system_error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub system_error: Option<String>,

    #[serde(flatten)]
    pub hosts: BTreeMap<String, HostResult>,
}

impl RunResults {
    pub fn is_empty(&self) -> bool {
        self.system_error.is_none() && self.hosts.is_empty()
    }

    pub fn host_mut(&mut self, name: &str) -> &mut HostResult {
        self.hosts.entry(name.to_string()).or_default()
    }

    /// (success_count, failed_count) over terminal host flags
    pub fn counts(&self) -> (u32, u32) {
        self.hosts.values().fold((0, 0), |(ok, bad), h| {
            if h.success {
                (ok + 1, bad)
            } else {
                (ok, bad + 1)
            }
        })
    }
}

/// JobRun Entity (one invocation of a Job)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: RunId,
    pub job_id: JobId,
    pub status: RunStatus,

    // Derived at finalize
    pub total_devices: u32,
    pub success_count: u32,
    pub failed_count: u32,

    pub results: RunResults,

    pub start_time: i64,           // epoch ms
    pub end_time: Option<i64>,     // epoch ms
    pub duration: Option<f64>,     // seconds, 2 decimals
    pub trigger_type: TriggerType,
}

impl JobRun {
    /// Create a run already in Running state
    pub fn start(
        id: impl Into<String>,
        job_id: impl Into<String>,
        trigger_type: TriggerType,
        now: i64,
    ) -> Self {
        Self {
            id: id.into(),
            job_id: job_id.into(),
            status: RunStatus::Running,
            total_devices: 0,
            success_count: 0,
            failed_count: 0,
            results: RunResults::default(),
            start_time: now,
            end_time: None,
            duration: None,
            trigger_type,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Seed one pending HostResult per resolved device
    pub fn seed_hosts<S: AsRef<str>>(&mut self, hosts: &[String], planned_steps: &[S]) {
        for host in hosts {
            self.results
                .hosts
                .insert(host.clone(), HostResult::pending(planned_steps));
        }
        self.total_devices = self.results.hosts.len() as u32;
    }

    /// Normal finalize: settle every host, recount, reduce status, stamp time
    pub fn finalize(&mut self, now: i64) -> Result<()> {
        self.ensure_running(RunStatus::Success)?;

        for host in self.results.hosts.values_mut() {
            host.finish();
        }
        let (ok, bad) = self.recount();
        self.status = if self.results.system_error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::from_counts(ok, bad)
        };
        self.stamp_end(now);
        Ok(())
    }

    /// Crash path: force every unfinished host/step to failed, record
    /// `system_error`, and end the run as Failed.
    ///
    /// Works from any non-terminal state so no run is left Running.
    pub fn fail(&mut self, message: &str, now: i64) {
        self.fail_unresolved(message);
        self.results.system_error = Some(message.to_string());
        self.recount();
        self.status = RunStatus::Failed;
        self.stamp_end(now);
    }

    /// Flip hosts still pending/running to failed with `message`
    pub fn fail_unresolved(&mut self, message: &str) {
        for host in self.results.hosts.values_mut() {
            if host.status.is_active() {
                host.force_fail(message);
            } else {
                // settled host: only its dangling steps
                for step in host.steps.iter_mut().filter(|s| s.status.is_active()) {
                    step.status = ProgressStatus::Failed;
                    step.success = false;
                    step.exception = Some(message.to_string());
                }
            }
        }
    }

    fn recount(&mut self) -> (u32, u32) {
        let (ok, bad) = self.results.counts();
        self.total_devices = self.results.hosts.len() as u32;
        self.success_count = ok;
        self.failed_count = bad;
        (ok, bad)
    }

    fn stamp_end(&mut self, now: i64) {
        self.end_time = Some(now);
        let secs = (now - self.start_time).max(0) as f64 / 1000.0;
        self.duration = Some((secs * 100.0).round() / 100.0);
    }

    fn ensure_running(&self, to: RunStatus) -> Result<()> {
        if self.status == RunStatus::Running {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(v: &str) -> StepOutcome {
        StepOutcome::success(Some(StepValue::text(v)))
    }

    #[test]
    fn test_status_reduction() {
        assert_eq!(RunStatus::from_counts(3, 0), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(2, 1), RunStatus::Partial);
        assert_eq!(RunStatus::from_counts(0, 3), RunStatus::Failed);
        assert_eq!(RunStatus::from_counts(0, 0), RunStatus::Failed);
    }

    #[test]
    fn test_step_key_is_idempotent() {
        let mut host = HostResult::default();
        for _ in 0..3 {
            host.mark_step_started("facts");
            host.record_step_completed("facts", ok("done"));
        }
        host.mark_step_started("facts");
        assert_eq!(host.steps.len(), 1);
        assert_eq!(host.steps[0].status, ProgressStatus::Running);
    }

    #[test]
    fn test_host_success_is_and_of_steps() {
        let mut host = HostResult::pending(&["a", "b"]);
        host.record_step_completed("a", ok("x"));
        assert!(!host.success, "pending step b keeps host unsuccessful");

        host.record_step_completed("b", ok("y"));
        assert!(host.success);

        host.record_step_completed("c", StepOutcome::failure("boom", None));
        assert!(!host.success);
        assert_eq!(host.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_failure_without_exception_text() {
        let mut host = HostResult::default();
        host.record_step_completed(
            "x",
            StepOutcome {
                succeeded: false,
                value: None,
                exception: None,
            },
        );
        assert_eq!(host.error.as_deref(), Some("Sub-task failed"));
    }

    #[test]
    fn test_finish_flips_unexecuted_steps() {
        let mut host = HostResult::pending(&["a", "b"]);
        host.record_step_completed("a", ok("x"));
        host.finish();

        assert_eq!(host.status, ProgressStatus::Failed);
        assert_eq!(host.steps[1].status, ProgressStatus::Failed);
        assert_eq!(host.steps[1].exception.as_deref(), Some(NOT_EXECUTED));
        assert!(!host.success);
    }

    #[test]
    fn test_finalize_partial() {
        let mut run = JobRun::start("r1", "j1", TriggerType::Manual, 1_000);
        run.seed_hosts(&["sw1".to_string(), "sw2".to_string()], &["step"]);
        run.results.host_mut("sw1").record_step_completed("step", ok("x"));
        run.results
            .host_mut("sw2")
            .record_step_completed("step", StepOutcome::failure("timeout", None));

        run.finalize(3_456).unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!((run.success_count, run.failed_count), (1, 1));
        assert_eq!(run.end_time, Some(3_456));
        assert_eq!(run.duration, Some(2.46));
    }

    #[test]
    fn test_finalize_twice_is_rejected() {
        let mut run = JobRun::start("r1", "j1", TriggerType::Manual, 0);
        run.seed_hosts(&["sw1".to_string()], &["step"]);
        run.finalize(10).unwrap();
        assert!(run.finalize(20).is_err());
    }

    #[test]
    fn test_crash_path_flips_running_hosts() {
        let mut run = JobRun::start("r1", "j1", TriggerType::Auto, 0);
        run.seed_hosts(&["sw1".to_string(), "sw2".to_string()], &["step"]);
        run.results.host_mut("sw1").record_step_completed("step", ok("x"));
        run.results.host_mut("sw1").finish();
        run.results.host_mut("sw2").mark_step_started("step");

        run.fail("inventory exploded", 500);

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.results.hosts["sw1"].success);
        let sw2 = &run.results.hosts["sw2"];
        assert_eq!(sw2.status, ProgressStatus::Failed);
        assert_eq!(sw2.steps[0].exception.as_deref(), Some("inventory exploded"));
        assert_eq!(
            run.results.system_error.as_deref(),
            Some("inventory exploded")
        );
        assert_eq!((run.success_count, run.failed_count), (1, 1));
    }

    #[test]
    fn test_results_wire_shape() {
        let mut results = RunResults::default();
        results.host_mut("sw1").mark_step_started("facts");
        results.system_error = Some("boom".to_string());

        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value["system_error"], "boom");
        assert_eq!(value["sw1"]["status"], "running");
        assert_eq!(value["sw1"]["steps"][0]["name"], "facts");

        let back: RunResults = serde_json::from_value(value).unwrap();
        assert_eq!(back, results);
    }

    #[test]
    fn test_coerce_falls_back_to_debug() {
        use std::collections::HashMap;

        // non-string map keys do not serialize to JSON
        let mut odd: HashMap<(u8, u8), u8> = HashMap::new();
        odd.insert((1, 2), 3);
        assert!(matches!(StepValue::coerce(&odd), StepValue::Text(_)));

        assert_eq!(StepValue::coerce("plain"), StepValue::text("plain"));
        assert!(matches!(
            StepValue::coerce(&vec![1, 2]),
            StepValue::Structured(_)
        ));
    }
}
