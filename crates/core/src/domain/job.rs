// Job Domain Model (automation job definition)

use crate::domain::error::{DomainError, Result};
use crate::domain::run::is_reserved_host_name;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Maximum length of a job name (bytes)
const MAX_NAME_LEN: usize = 255;

/// What a job does on each target device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Query,
    Backup,
    Config,
    Inspect,
    Diagnosis,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Query => "query",
            TaskType::Backup => "backup",
            TaskType::Config => "config",
            TaskType::Inspect => "inspect",
            TaskType::Diagnosis => "diagnosis",
        }
    }

    /// Query and Config carry their payload in `commands`
    pub fn requires_commands(&self) -> bool {
        matches!(self, TaskType::Query | TaskType::Config)
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "query" => Ok(TaskType::Query),
            "backup" => Ok(TaskType::Backup),
            "config" => Ok(TaskType::Config),
            "inspect" => Ok(TaskType::Inspect),
            "diagnosis" => Ok(TaskType::Diagnosis),
            other => Err(DomainError::ValidationError(format!(
                "unknown task type: {}",
                other
            ))),
        }
    }
}

/// When a job fires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    #[default]
    Immediate,
    Once,
    Cron,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Immediate => "immediate",
            ScheduleType::Once => "once",
            ScheduleType::Cron => "cron",
        }
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(ScheduleType::Immediate),
            "once" => Ok(ScheduleType::Once),
            "cron" => Ok(ScheduleType::Cron),
            other => Err(DomainError::ValidationError(format!(
                "unknown schedule type: {}",
                other
            ))),
        }
    }
}

/// Trigger identifier for a job's armed schedule
pub fn trigger_key(job_id: &str) -> String {
    format!("job_{}", job_id)
}

/// Job Entity
///
/// Holds device *names* only. Connection data is resolved against the
/// inventory when a run starts, never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub task_type: TaskType,

    // Execution target (empty = whole inventory)
    pub target_devices: Vec<String>,

    // Payload for Query/Config
    #[serde(default)]
    pub commands: Vec<String>,

    // Schedule
    pub schedule_type: ScheduleType,
    pub schedule_value: Option<String>,
    pub is_active: bool,

    pub created_by: Option<String>,
    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms
}

impl Job {
    /// Create a new immediate, active job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `name` - Human readable name
    /// * `task_type` - What to run on each device
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        name: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            task_type,
            target_devices: Vec::new(),
            commands: Vec::new(),
            schedule_type: ScheduleType::Immediate,
            schedule_value: None,
            is_active: true,
            created_by: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (test-job-1, test-job-2, ...).
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(name: impl Into<String>, task_type: TaskType) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-job-{}", counter),
            (counter * 1000) as i64,
            name,
            task_type,
        )
    }

    /// Trigger key used by the scheduler (`job_<id>`)
    pub fn trigger_key(&self) -> String {
        trigger_key(&self.id)
    }

    /// Check definition-level invariants.
    ///
    /// Schedule *syntax* (cron / timestamp) is checked by the scheduler, which
    /// owns the trigger dialect.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::ValidationError(
                "job name cannot be empty".to_string(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(DomainError::ValidationError(format!(
                "job name too long (max {} bytes)",
                MAX_NAME_LEN
            )));
        }

        let has_value = self
            .schedule_value
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty());
        match self.schedule_type {
            ScheduleType::Immediate => {}
            ScheduleType::Once | ScheduleType::Cron if !has_value => {
                return Err(DomainError::InvalidSchedule(format!(
                    "schedule_value is required for {} schedules",
                    self.schedule_type
                )));
            }
            _ => {}
        }

        if self.task_type.requires_commands()
            && self.commands.iter().all(|c| c.trim().is_empty())
        {
            return Err(DomainError::ValidationError(format!(
                "{} jobs require at least one command",
                self.task_type
            )));
        }

        if self.target_devices.iter().any(|d| d.trim().is_empty()) {
            return Err(DomainError::ValidationError(
                "target device names cannot be empty".to_string(),
            ));
        }
        if let Some(reserved) = self
            .target_devices
            .iter()
            .find(|d| is_reserved_host_name(d.trim()))
        {
            return Err(DomainError::ValidationError(format!(
                "'{}' is reserved and cannot be a device name",
                reserved
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_key_format() {
        let job = Job::new("42", 0, "nightly backup", TaskType::Backup);
        assert_eq!(job.trigger_key(), "job_42");
    }

    #[test]
    fn test_task_type_round_trip_strings() {
        for t in [
            TaskType::Query,
            TaskType::Backup,
            TaskType::Config,
            TaskType::Inspect,
            TaskType::Diagnosis,
        ] {
            assert_eq!(t.as_str().parse::<TaskType>().unwrap(), t);
        }
        assert!("reboot".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_cron_requires_value() {
        let mut job = Job::new_test("cron job", TaskType::Inspect);
        job.schedule_type = ScheduleType::Cron;
        assert!(matches!(
            job.validate(),
            Err(DomainError::InvalidSchedule(_))
        ));

        job.schedule_value = Some("0 2 * * *".to_string());
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_query_requires_commands() {
        let mut job = Job::new_test("show version", TaskType::Query);
        assert!(job.validate().is_err());

        job.commands = vec!["display version".to_string()];
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_reserved_target_name_rejected() {
        let mut job = Job::new_test("inspect", TaskType::Inspect);
        job.target_devices = vec!["sw1".to_string(), "system_error".to_string()];
        let err = job.validate().unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let job = Job::new_test("   ", TaskType::Inspect);
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_serialized_enums_are_lowercase() {
        let job = Job::new("1", 0, "inspect all", TaskType::Inspect);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["task_type"], "inspect");
        assert_eq!(value["schedule_type"], "immediate");
    }
}
