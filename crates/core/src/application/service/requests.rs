// Request/response types of the automation use cases

use crate::domain::{JobId, RunId, ScheduleType, TaskType};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Create-job request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub task_type: TaskType,

    #[serde(default)]
    pub target_devices: Vec<String>,

    #[serde(default)]
    pub commands: Vec<String>,

    #[serde(default)]
    pub schedule_type: ScheduleType,

    #[serde(default)]
    pub schedule_value: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewJob {
    pub fn new(name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            name: name.into(),
            task_type,
            target_devices: Vec::new(),
            commands: Vec::new(),
            schedule_type: ScheduleType::Immediate,
            schedule_value: None,
            is_active: true,
            created_by: None,
        }
    }
}

/// Partial update of a job; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_devices: Option<Vec<String>>,
    #[serde(default)]
    pub commands: Option<Vec<String>>,
    #[serde(default)]
    pub schedule_type: Option<ScheduleType>,
    #[serde(default)]
    pub schedule_value: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Ad-hoc run against a handful of devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickTask {
    pub task_type: TaskType,
    pub device_names: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Outcome of creating a job (an Immediate job also starts a run)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCreated {
    pub job_id: JobId,
    pub run_id: Option<RunId>,
}

/// Outcome of a quick task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickTaskStarted {
    pub job_id: JobId,
    pub job_name: String,
    pub run_id: RunId,
}
