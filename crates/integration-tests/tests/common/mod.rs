//! Shared wiring: SQLite store + in-memory inventory and scripted drivers
#![allow(dead_code)]

use async_trait::async_trait;
use netops_core::application::{
    shutdown_channel, AutomationService, EngineConfig, ExecutionEngine, JobRunner, NewJob,
    Scheduler, ShutdownSender, TaskRegistry,
};
use netops_core::domain::{HostResult, JobRun, RunId, RunStatus, TaskType};
use netops_core::port::device_driver::mocks::MockDriverFactory;
use netops_core::port::id_provider::UuidProvider;
use netops_core::port::inventory::mocks::StaticInventory;
use netops_core::port::time_provider::SystemTimeProvider;
use netops_core::port::{DeviceInventory, RunRepository, TimeProvider};
use netops_core::Result;
use netops_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn memory_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// Run store that notes the instant each run was written in a terminal state
pub struct FinalizeRecorder {
    inner: Arc<SqliteJobRepository>,
    finalized: Mutex<Vec<(RunId, Instant)>>,
}

impl FinalizeRecorder {
    pub fn new(inner: Arc<SqliteJobRepository>) -> Self {
        Self {
            inner,
            finalized: Mutex::new(Vec::new()),
        }
    }

    pub fn finalized_at(&self, run_id: &RunId) -> Option<Instant> {
        self.finalized
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == run_id)
            .map(|(_, at)| *at)
    }
}

#[async_trait]
impl RunRepository for FinalizeRecorder {
    async fn insert_run(&self, run: &JobRun) -> Result<()> {
        self.inner.insert_run(run).await
    }

    async fn find_run(&self, id: &RunId) -> Result<Option<JobRun>> {
        self.inner.find_run(id).await
    }

    async fn find_host_result(&self, run_id: &RunId, host: &str) -> Result<Option<HostResult>> {
        self.inner.find_host_result(run_id, host).await
    }

    async fn update_run(&self, run: &JobRun) -> Result<()> {
        self.inner.update_run(run).await?;
        if run.status.is_terminal() {
            self.finalized
                .lock()
                .unwrap()
                .push((run.id.clone(), Instant::now()));
        }
        Ok(())
    }

    async fn upsert_host_result(
        &self,
        run_id: &RunId,
        host: &str,
        result: &HostResult,
    ) -> Result<()> {
        self.inner.upsert_host_result(run_id, host, result).await
    }

    async fn list_runs(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<JobRun>> {
        self.inner.list_runs(job_id, limit).await
    }

    async fn list_recent_runs(&self, statuses: &[RunStatus], limit: usize) -> Result<Vec<JobRun>> {
        self.inner.list_recent_runs(statuses, limit).await
    }

    async fn find_runs_by_status(&self, status: RunStatus) -> Result<Vec<JobRun>> {
        self.inner.find_runs_by_status(status).await
    }

    async fn delete_run(&self, id: &RunId) -> Result<bool> {
        self.inner.delete_run(id).await
    }
}

pub struct Harness {
    pub repo: Arc<SqliteJobRepository>,
    pub runs: Arc<FinalizeRecorder>,
    pub drivers: Arc<MockDriverFactory>,
    pub runner: Arc<JobRunner>,
    pub scheduler: Arc<Scheduler>,
    pub service: Arc<AutomationService>,
    pub backup_dir: TempDir,
    _shutdown: ShutdownSender,
}

impl Harness {
    pub async fn new(devices: &[&str]) -> Self {
        Self::build(
            memory_pool().await,
            Arc::new(StaticInventory::with_names(devices)),
            MockDriverFactory::new(),
            false,
        )
    }

    pub fn build(
        pool: SqlitePool,
        inventory: Arc<dyn DeviceInventory>,
        drivers: MockDriverFactory,
        strict_targets: bool,
    ) -> Self {
        let backup_dir = tempfile::tempdir().unwrap();
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let repo = Arc::new(SqliteJobRepository::new(pool));
        let runs = Arc::new(FinalizeRecorder::new(repo.clone()));
        let drivers = Arc::new(drivers);

        let engine = Arc::new(ExecutionEngine::new(
            runs.clone(),
            inventory.clone(),
            drivers.clone(),
            TaskRegistry::standard(),
            time.clone(),
            EngineConfig {
                max_workers: 10,
                backup_dir: backup_dir.path().to_path_buf(),
                strict_targets,
            },
        ));
        let runner = Arc::new(JobRunner::new(
            engine,
            runs.clone(),
            Arc::new(UuidProvider),
            time.clone(),
        ));
        let (shutdown, token) = shutdown_channel();
        let scheduler = Arc::new(Scheduler::new(runner.clone(), time.clone(), token));
        let service = Arc::new(AutomationService::new(
            repo.clone(),
            runs.clone(),
            inventory,
            scheduler.clone(),
            runner.clone(),
            Arc::new(UuidProvider),
            time,
        ));

        Self {
            repo,
            runs,
            drivers,
            runner,
            scheduler,
            service,
            backup_dir,
            _shutdown: shutdown,
        }
    }

    /// Wait for every in-flight run, then load `run_id`
    pub async fn finished_run(&self, run_id: &RunId) -> JobRun {
        assert!(
            self.runner.wait_idle(RUN_TIMEOUT).await,
            "runs still in flight after {:?}",
            RUN_TIMEOUT
        );
        self.service.get_run(run_id).await.unwrap()
    }

    /// Create an inactive job (nothing fires) and return its id
    pub async fn parked_job(&self, name: &str, task: TaskType, targets: &[&str]) -> String {
        let mut req = job(name, task, targets);
        req.is_active = false;
        self.service.create_job(req).await.unwrap().job_id
    }
}

pub fn job(name: &str, task: TaskType, targets: &[&str]) -> NewJob {
    let mut req = NewJob::new(name, task);
    req.target_devices = targets.iter().map(|t| t.to_string()).collect();
    req
}

/// Host success must be the AND of its steps
pub fn assert_host_consistent(run: &JobRun) {
    for (host, result) in &run.results.hosts {
        let all_steps_ok = result.steps.iter().all(|s| s.success);
        assert_eq!(
            result.success, all_steps_ok,
            "host {} success={} but steps={:?}",
            host, result.success, result.steps
        );
    }
}
