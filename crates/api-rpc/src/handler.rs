//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC params to `AutomationService` calls.

use crate::error::to_rpc_error;
use crate::types::{
    DeleteJobResponse, DeleteRunResponse, HealthResponse, JobRef, ListRunsRequest, RunNowResponse,
    RunRef, UpdateJobRequest,
};
use jsonrpsee::types::ErrorObjectOwned;
use netops_core::application::{
    AutomationService, FleetSummary, JobCreated, NewJob, QuickTask, QuickTaskStarted, RunSummary,
};
use netops_core::domain::{Job, JobRun};
use std::sync::Arc;
use tracing::debug;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<AutomationService>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(service: Arc<AutomationService>) -> Self {
        Self {
            service,
            start_time: std::time::Instant::now(),
        }
    }

    /// automation.job.create.v1
    pub async fn create_job(&self, req: NewJob) -> RpcResult<JobCreated> {
        debug!(name = %req.name, task_type = %req.task_type, "create_job");
        self.service.create_job(req).await.map_err(to_rpc_error)
    }

    /// automation.job.get.v1
    pub async fn get_job(&self, req: JobRef) -> RpcResult<Job> {
        self.service.get_job(&req.job_id).await.map_err(to_rpc_error)
    }

    /// automation.job.list.v1
    pub async fn list_jobs(&self) -> RpcResult<Vec<Job>> {
        self.service.list_jobs().await.map_err(to_rpc_error)
    }

    /// automation.job.update.v1
    pub async fn update_job(&self, req: UpdateJobRequest) -> RpcResult<Job> {
        self.service
            .update_job(&req.job_id, req.update)
            .await
            .map_err(to_rpc_error)
    }

    /// automation.job.delete.v1
    pub async fn delete_job(&self, req: JobRef) -> RpcResult<DeleteJobResponse> {
        self.service
            .delete_job(&req.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeleteJobResponse {
            job_id: req.job_id,
            deleted: true,
        })
    }

    /// automation.job.run.v1
    pub async fn run_now(&self, req: JobRef) -> RpcResult<RunNowResponse> {
        let run_id = self
            .service
            .run_now(&req.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(RunNowResponse {
            job_id: req.job_id,
            run_id,
        })
    }

    /// automation.quick_task.v1
    pub async fn quick_task(&self, req: QuickTask) -> RpcResult<QuickTaskStarted> {
        self.service.quick_task(req).await.map_err(to_rpc_error)
    }

    /// automation.run.get.v1
    pub async fn get_run(&self, req: RunRef) -> RpcResult<JobRun> {
        self.service.get_run(&req.run_id).await.map_err(to_rpc_error)
    }

    /// automation.run.list.v1
    pub async fn list_runs(&self, req: ListRunsRequest) -> RpcResult<Vec<JobRun>> {
        self.service
            .list_runs(req.job_id.as_deref(), req.limit)
            .await
            .map_err(to_rpc_error)
    }

    /// automation.run.delete.v1
    pub async fn delete_run(&self, req: RunRef) -> RpcResult<DeleteRunResponse> {
        self.service
            .delete_run(&req.run_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeleteRunResponse {
            run_id: req.run_id,
            deleted: true,
        })
    }

    /// automation.run.summary.v1
    pub async fn run_summary(&self, req: RunRef) -> RpcResult<RunSummary> {
        self.service
            .run_summary(&req.run_id)
            .await
            .map_err(to_rpc_error)
    }

    /// automation.inventory.summary.v1
    pub async fn fleet_summary(&self) -> RpcResult<FleetSummary> {
        debug!("fleet_summary");
        self.service.fleet_summary().await.map_err(to_rpc_error)
    }

    /// system.health.v1
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            version: netops_core::VERSION.to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            in_flight_runs: self.service.in_flight_runs(),
            armed_triggers: self.service.scheduler().armed(),
        }
    }
}
