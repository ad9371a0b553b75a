// Automation Service - use cases exposed to the API layer

pub mod requests;

pub use requests::{JobCreated, JobUpdate, NewJob, QuickTask, QuickTaskStarted};

use crate::application::constants::{
    DEFAULT_RUN_LIST_LIMIT, FLEET_SCAN_RUNS, MAX_RUN_LIST_LIMIT,
};
use crate::application::runner::JobRunner;
use crate::application::scheduler::Scheduler;
use crate::application::summary::{summarize, summarize_fleet, FleetSummary, RunSummary};
use crate::domain::{Job, JobId, JobRun, RunId, RunStatus, ScheduleType, TaskType, TriggerType};
use crate::error::{AppError, Result};
use crate::port::{DeviceInventory, IdProvider, JobRepository, RunRepository, TimeProvider};
use chrono::{Local, TimeZone};
use std::sync::Arc;
use tracing::{info, warn};

/// Job name of a quick task: `Quick <task>-<first device>[ +N more]-HH:MM`
pub fn quick_task_name(task_type: TaskType, devices: &[String], now_millis: i64) -> String {
    let first = devices.first().map(String::as_str).unwrap_or("unknown");
    let more = match devices.len() {
        0 | 1 => String::new(),
        n => format!(" +{} more", n - 1),
    };
    let clock = Local
        .timestamp_millis_opt(now_millis)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    format!("Quick {}-{}{}-{}", task_type, first, more, clock)
}

/// Automation Service
///
/// Owns job CRUD, run history and the hand-off to the scheduler. Every
/// definition is validated (including its schedule syntax) before it is
/// stored, so a stored job always arms.
pub struct AutomationService {
    jobs: Arc<dyn JobRepository>,
    runs: Arc<dyn RunRepository>,
    inventory: Arc<dyn DeviceInventory>,
    scheduler: Arc<Scheduler>,
    runner: Arc<JobRunner>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl AutomationService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        runs: Arc<dyn RunRepository>,
        inventory: Arc<dyn DeviceInventory>,
        scheduler: Arc<Scheduler>,
        runner: Arc<JobRunner>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            jobs,
            runs,
            inventory,
            scheduler,
            runner,
            id_provider,
            time_provider,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Runs created but not yet terminal
    pub fn in_flight_runs(&self) -> usize {
        self.runner.in_flight()
    }

    /// Create, persist and arm a job.
    ///
    /// An Immediate job starts its run right away and the run id is returned.
    pub async fn create_job(&self, req: NewJob) -> Result<JobCreated> {
        let mut job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            req.name.trim(),
            req.task_type,
        );
        job.target_devices = req.target_devices;
        job.commands = req.commands;
        job.schedule_type = req.schedule_type;
        job.schedule_value = req.schedule_value;
        job.is_active = req.is_active;
        job.created_by = req.created_by;

        job.validate()?;
        self.scheduler.validate_schedule(&job)?;

        self.jobs.insert(&job).await?;
        info!(
            job_id = %job.id,
            name = %job.name,
            task_type = %job.task_type,
            schedule = %job.schedule_type,
            "Job created"
        );

        let run_id = self.scheduler.add_job(&job).await?;
        Ok(JobCreated {
            job_id: job.id,
            run_id,
        })
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", id)))
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.jobs.list().await
    }

    /// Apply a partial update, then re-arm the trigger (remove, then add).
    ///
    /// Immediate jobs are not re-fired by an update.
    pub async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<Job> {
        let mut job = self.get_job(id).await?;

        if let Some(name) = update.name {
            job.name = name.trim().to_string();
        }
        if let Some(targets) = update.target_devices {
            job.target_devices = targets;
        }
        if let Some(commands) = update.commands {
            job.commands = commands;
        }
        if let Some(schedule_type) = update.schedule_type {
            job.schedule_type = schedule_type;
            if schedule_type == ScheduleType::Immediate {
                job.schedule_value = None;
            }
        }
        if update.schedule_value.is_some() {
            job.schedule_value = update.schedule_value;
        }
        if let Some(active) = update.is_active {
            job.is_active = active;
        }
        job.updated_at = self.time_provider.now_millis();

        job.validate()?;
        self.scheduler.validate_schedule(&job)?;
        self.jobs.update(&job).await?;

        self.scheduler.remove_job(&job.id);
        if job.schedule_type != ScheduleType::Immediate {
            self.scheduler.add_job(&job).await?;
        }
        info!(job_id = %job.id, active = job.is_active, "Job updated");
        Ok(job)
    }

    /// Disarm and delete a job. Its run history is kept.
    pub async fn delete_job(&self, id: &JobId) -> Result<()> {
        self.scheduler.remove_job(id);
        if !self.jobs.delete(id).await? {
            return Err(AppError::NotFound(format!("job {}", id)));
        }
        info!(job_id = %id, "Job deleted");
        Ok(())
    }

    /// Start a Manual run now; returns as soon as the run record exists
    pub async fn run_now(&self, id: &JobId) -> Result<RunId> {
        let job = self.get_job(id).await?;
        self.runner.run_now(&job, TriggerType::Manual).await
    }

    /// Create an Immediate job for the given devices and run it
    pub async fn quick_task(&self, req: QuickTask) -> Result<QuickTaskStarted> {
        let devices: Vec<String> = req
            .device_names
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        if devices.is_empty() {
            return Err(AppError::Validation(
                "quick task needs at least one device".to_string(),
            ));
        }

        let now = self.time_provider.now_millis();
        let mut job = Job::new(
            self.id_provider.generate_id(),
            now,
            quick_task_name(req.task_type, &devices, now),
            req.task_type,
        );
        job.target_devices = devices;
        job.commands = req.commands;
        job.created_by = req.created_by;
        job.validate()?;

        self.jobs.insert(&job).await?;
        let run_id = self.runner.run_now(&job, TriggerType::Manual).await?;
        info!(job_id = %job.id, run_id = %run_id, name = %job.name, "Quick task started");

        Ok(QuickTaskStarted {
            job_id: job.id,
            job_name: job.name,
            run_id,
        })
    }

    pub async fn get_run(&self, id: &RunId) -> Result<JobRun> {
        self.runs
            .find_run(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("run {}", id)))
    }

    /// Newest first; a zero limit means the default page size
    pub async fn list_runs(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<JobRun>> {
        let limit = match limit {
            0 => DEFAULT_RUN_LIST_LIMIT,
            n => n.min(MAX_RUN_LIST_LIMIT),
        };
        self.runs.list_runs(job_id, limit).await
    }

    /// Delete a finished run
    ///
    /// # Errors
    /// - AppError::Conflict while the run is still Running
    pub async fn delete_run(&self, id: &RunId) -> Result<()> {
        let run = self.get_run(id).await?;
        if run.is_running() {
            return Err(AppError::Conflict(format!("run {} is still running", id)));
        }
        if !self.runs.delete_run(id).await? {
            warn!(run_id = %id, "Run vanished before delete");
        }
        info!(run_id = %id, "Run deleted");
        Ok(())
    }

    pub async fn run_summary(&self, id: &RunId) -> Result<RunSummary> {
        Ok(summarize(&self.get_run(id).await?))
    }

    /// Latest inspection snapshot of every inventory device
    pub async fn fleet_summary(&self) -> Result<FleetSummary> {
        let devices = self.inventory.resolve(&[]).await?;
        let recent = self
            .runs
            .list_recent_runs(&[RunStatus::Success, RunStatus::Partial], FLEET_SCAN_RUNS)
            .await?;
        Ok(summarize_fleet(&devices, &recent))
    }

    /// Re-arm persisted cron jobs (process start)
    pub async fn restore_schedules(&self) -> Result<usize> {
        self.scheduler.restore(self.jobs.as_ref()).await
    }
}
