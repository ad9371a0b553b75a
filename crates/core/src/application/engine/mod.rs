//! Execution Engine - fans one run out across the resolved device set
//!
//! Resolution, initialization, bounded dispatch (one worker per device),
//! finalization. Any error or panic before finalize goes through the crash
//! path so a run never stays Running.

mod reporter;

pub use reporter::StoreProgressReporter;

use crate::application::constants::{
    DEFAULT_MAX_WORKERS, NO_DEVICES_MESSAGE, UNKNOWN_DEVICE_MESSAGE,
};
use crate::application::panic_guard::join_error_message;
use crate::application::tasks::{StepRecorder, TaskContext, TaskFunction, TaskRegistry};
use crate::domain::{is_reserved_host_name, DeviceHandle, Job, JobRun, RunId, StepOutcome};
use crate::error::{AppError, Result};
use crate::port::{
    DeviceInventory, DriverFactory, ProgressObserver, RunRepository, TimeProvider,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent device sessions per run
    pub max_workers: usize,
    /// Root of Backup task output
    pub backup_dir: PathBuf,
    /// Unknown target names become failed hosts instead of being dropped
    pub strict_targets: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            backup_dir: PathBuf::from("backups"),
            strict_targets: false,
        }
    }
}

pub struct ExecutionEngine {
    runs: Arc<dyn RunRepository>,
    inventory: Arc<dyn DeviceInventory>,
    drivers: Arc<dyn DriverFactory>,
    registry: TaskRegistry,
    time_provider: Arc<dyn TimeProvider>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        runs: Arc<dyn RunRepository>,
        inventory: Arc<dyn DeviceInventory>,
        drivers: Arc<dyn DriverFactory>,
        registry: TaskRegistry,
        time_provider: Arc<dyn TimeProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            runs,
            inventory,
            drivers,
            registry,
            time_provider,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a persisted Running run to a terminal state.
    ///
    /// Errors are handled internally by the crash path; the returned error
    /// only reports a store that could not be written at all.
    pub async fn execute(&self, run_id: &RunId, job: &Job) -> Result<JobRun> {
        match self.try_execute(run_id, job).await {
            Ok(run) => Ok(run),
            Err(e) => {
                error!(run_id = %run_id, job_id = %job.id, error = %e, "Run crashed before finalize");
                self.force_fail(run_id, &format!("engine crashed: {}", e))
                    .await
            }
        }
    }

    /// Crash path: flip unfinished hosts/steps to failed, record
    /// `system_error`, end the run as Failed. No-op on terminal runs.
    pub async fn force_fail(&self, run_id: &RunId, message: &str) -> Result<JobRun> {
        let mut run = self
            .runs
            .find_run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("run {}", run_id)))?;

        if run.status.is_terminal() {
            return Ok(run);
        }
        run.fail(message, self.time_provider.now_millis());
        self.runs.update_run(&run).await?;
        warn!(run_id = %run_id, message = %message, "Run force-finalized as failed");
        Ok(run)
    }

    async fn load(&self, run_id: &RunId) -> Result<JobRun> {
        self.runs
            .find_run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("run {}", run_id)))
    }

    async fn try_execute(&self, run_id: &RunId, job: &Job) -> Result<JobRun> {
        let task = self.registry.get(job.task_type).ok_or_else(|| {
            AppError::Internal(format!("no task registered for {}", job.task_type))
        })?;

        // Full inventory reload, once per run
        let devices = self.inventory.resolve(&job.target_devices).await?;
        let missing = if self.config.strict_targets {
            let known: HashSet<&str> = devices.iter().map(|d| d.name.as_str()).collect();
            job.target_devices
                .iter()
                .filter(|n| !known.contains(n.as_str()) && !is_reserved_host_name(n))
                .cloned()
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        let mut run = self.load(run_id).await?;

        if devices.is_empty() && missing.is_empty() {
            run.fail(NO_DEVICES_MESSAGE, self.time_provider.now_millis());
            self.runs.update_run(&run).await?;
            warn!(run_id = %run_id, job_id = %job.id, targets = ?job.target_devices, "No devices resolved, run failed");
            return Ok(run);
        }

        // Initialize: pollers see every host in progress from the start
        let planned = task.planned_steps();
        let names: Vec<String> = devices.iter().map(|d| d.name.clone()).collect();
        run.seed_hosts(&names, &planned);
        if !missing.is_empty() {
            run.seed_hosts(&missing, &planned);
            for name in &missing {
                run.results.host_mut(name).force_fail(UNKNOWN_DEVICE_MESSAGE);
            }
        }
        self.runs.update_run(&run).await?;

        info!(
            run_id = %run_id,
            job_id = %job.id,
            task = %job.task_type,
            devices = devices.len(),
            unknown = missing.len(),
            "Dispatching run"
        );

        let reporter: Arc<dyn ProgressObserver> =
            Arc::new(StoreProgressReporter::new(run_id.clone(), self.runs.clone()));
        self.dispatch(task, devices, job, reporter).await?;

        let mut run = self.load(run_id).await?;
        run.finalize(self.time_provider.now_millis())?;
        self.runs.update_run(&run).await?;

        info!(
            run_id = %run_id,
            job_id = %job.id,
            status = %run.status,
            success = run.success_count,
            failed = run.failed_count,
            duration_secs = run.duration.unwrap_or_default(),
            "Run finalized"
        );
        Ok(run)
    }

    /// One isolated worker per device, bounded by the pool size
    async fn dispatch(
        &self,
        task: Arc<dyn TaskFunction>,
        devices: Vec<DeviceHandle>,
        job: &Job,
        reporter: Arc<dyn ProgressObserver>,
    ) -> Result<()> {
        let pool = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let ctx = Arc::new(TaskContext {
            commands: job.commands.clone(),
            backup_dir: self.config.backup_dir.clone(),
            time_provider: self.time_provider.clone(),
        });

        let mut handles = Vec::with_capacity(devices.len());
        for device in devices {
            let permit = pool
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(format!("worker pool closed: {}", e)))?;
            let host = device.name.clone();
            let task = task.clone();
            let ctx = ctx.clone();
            let drivers = self.drivers.clone();
            let recorder = StepRecorder::new(host.clone(), reporter.clone());

            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_device(task.as_ref(), drivers.as_ref(), &device, &ctx, &recorder).await;
            });
            handles.push((host, handle));
        }

        // A panicking worker fails its own host only
        for (host, handle) in handles {
            if let Err(join_err) = handle.await {
                let message = join_error_message(join_err);
                error!(host = %host, error = %message, "Device worker died");
                reporter
                    .on_step_completed(&host, task.name(), StepOutcome::failure(message, None))
                    .await;
            }
        }
        Ok(())
    }
}

/// Device worker body: open a session, run the task as the top-level step
async fn run_device(
    task: &dyn TaskFunction,
    drivers: &dyn DriverFactory,
    device: &DeviceHandle,
    ctx: &TaskContext,
    steps: &StepRecorder,
) {
    let top = task.name();
    steps.started(top).await;

    let driver = match drivers.create(device) {
        Ok(driver) => driver,
        Err(e) => {
            warn!(host = %device.name, error = %e, "Device session failed");
            steps
                .completed(top, StepOutcome::failure(e.to_string(), None))
                .await;
            return;
        }
    };

    let outcome = match task.run(driver.as_ref(), ctx, steps).await {
        Ok(value) => StepOutcome::success(Some(value)),
        Err(e) => {
            warn!(host = %device.name, task = top, error = %e, "Task failed on device");
            StepOutcome::failure(e.to_string(), e.partial_output())
        }
    };
    steps.completed(top, outcome).await;
}
