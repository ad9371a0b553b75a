//! RPC Request/Response Types
//!
//! Method parameters and results not already covered by the core's
//! request types (`NewJob`, `JobUpdate`, `QuickTask`).

use netops_core::application::JobUpdate;
use serde::{Deserialize, Serialize};

/// automation.job.get.v1 / job.delete.v1 / job.run.v1
#[derive(Debug, Deserialize)]
pub struct JobRef {
    pub job_id: String,
}

/// automation.job.update.v1
#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub job_id: String,
    #[serde(flatten)]
    pub update: JobUpdate,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteJobResponse {
    pub job_id: String,
    pub deleted: bool,
}

/// automation.job.run.v1
#[derive(Debug, Clone, Serialize)]
pub struct RunNowResponse {
    pub job_id: String,
    pub run_id: String,
}

/// automation.run.get.v1 / run.delete.v1 / run.summary.v1
#[derive(Debug, Deserialize)]
pub struct RunRef {
    pub run_id: String,
}

/// automation.run.list.v1
#[derive(Debug, Default, Deserialize)]
pub struct ListRunsRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    /// 0 = server default
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteRunResponse {
    pub run_id: String,
    pub deleted: bool,
}

/// system.health.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub in_flight_runs: usize,
    pub armed_triggers: Vec<String>,
}
