//! Scheduler - arms triggers for job definitions
//!
//! - Immediate: fire once, now
//! - Once: fire once at an RFC 3339 instant
//! - Cron: recurring, local time, keyed `job_<id>`
//!
//! A cron trigger awaits its own run before computing the next firing, so
//! firings missed while a run is still executing are skipped.

use crate::application::runner::JobRunner;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{trigger_key, DomainError, Job, JobId, RunId, ScheduleType, TriggerType};
use crate::error::Result;
use crate::port::{JobRepository, TimeProvider};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Parse a cron expression.
///
/// Standard 5-field crontab is padded to the 7-field form (seconds and
/// year); 6- and 7-field expressions are taken as-is.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let padded = match expr.split_whitespace().count() {
        5 => format!("0 {} *", expr),
        _ => expr.to_string(),
    };
    Schedule::from_str(&padded).map_err(|e| {
        DomainError::InvalidSchedule(format!("invalid cron expression '{}': {}", expr, e)).into()
    })
}

/// Parse a one-shot instant: RFC 3339, or a naive timestamp in local time
pub fn parse_once(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            DomainError::InvalidSchedule(format!("invalid timestamp '{}'", value)).into()
        })
}

pub struct Scheduler {
    runner: Arc<JobRunner>,
    time_provider: Arc<dyn TimeProvider>,
    triggers: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: ShutdownToken,
}

impl Scheduler {
    pub fn new(
        runner: Arc<JobRunner>,
        time_provider: Arc<dyn TimeProvider>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            runner,
            time_provider,
            triggers: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Check a job's schedule value without arming anything
    pub fn validate_schedule(&self, job: &Job) -> Result<()> {
        match job.schedule_type {
            ScheduleType::Immediate => Ok(()),
            ScheduleType::Cron => {
                parse_cron(job.schedule_value.as_deref().unwrap_or_default()).map(|_| ())
            }
            ScheduleType::Once => {
                let at = parse_once(job.schedule_value.as_deref().unwrap_or_default())?;
                if at.timestamp_millis() <= self.time_provider.now_millis() {
                    return Err(DomainError::InvalidSchedule(format!(
                        "once schedule {} is in the past",
                        at.to_rfc3339()
                    ))
                    .into());
                }
                Ok(())
            }
        }
    }

    /// Arm the job's trigger.
    ///
    /// Inactive jobs are a no-op. Immediate jobs fire now and hand back the
    /// run id; Once/Cron replace any trigger already armed for the job.
    pub async fn add_job(&self, job: &Job) -> Result<Option<RunId>> {
        if !job.is_active {
            info!(job_id = %job.id, "Job inactive, no trigger armed");
            return Ok(None);
        }

        match job.schedule_type {
            ScheduleType::Immediate => {
                let run_id = self.runner.run_now(job, TriggerType::Manual).await?;
                Ok(Some(run_id))
            }
            ScheduleType::Cron => {
                let schedule = parse_cron(job.schedule_value.as_deref().unwrap_or_default())?;
                let handle = tokio::spawn(cron_loop(
                    self.runner.clone(),
                    job.clone(),
                    schedule,
                    self.shutdown.clone(),
                ));
                self.arm(job, handle);
                Ok(None)
            }
            ScheduleType::Once => {
                self.validate_schedule(job)?;
                let at = parse_once(job.schedule_value.as_deref().unwrap_or_default())?;
                let delay = Duration::from_millis(
                    (at.timestamp_millis() - self.time_provider.now_millis()).max(0) as u64,
                );
                let handle = tokio::spawn(once_trigger(
                    self.runner.clone(),
                    job.clone(),
                    delay,
                    self.shutdown.clone(),
                ));
                self.arm(job, handle);
                Ok(None)
            }
        }
    }

    fn arm(&self, job: &Job, handle: JoinHandle<()>) {
        let key = job.trigger_key();
        let mut triggers = self.triggers.lock().unwrap_or_else(|p| p.into_inner());
        triggers.retain(|_, h| !h.is_finished());
        if let Some(old) = triggers.insert(key.clone(), handle) {
            old.abort();
        }
        info!(job_id = %job.id, trigger = %key, schedule = %job.schedule_type, "Trigger armed");
    }

    /// Best-effort removal of `job_<id>`; a missing trigger is only logged
    pub fn remove_job(&self, job_id: &JobId) {
        let key = trigger_key(job_id);
        let removed = self
            .triggers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&key);
        match removed {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!(trigger = %key, "Trigger removed");
            }
            _ => warn!(trigger = %key, "No armed trigger to remove"),
        }
    }

    /// Whether a live trigger is armed for the job
    pub fn is_armed(&self, job_id: &JobId) -> bool {
        self.triggers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&trigger_key(job_id))
            .is_some_and(|h| !h.is_finished())
    }

    /// Keys of all live triggers, sorted
    pub fn armed(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .triggers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Re-arm every active cron job. Immediate/Once jobs are never restored.
    ///
    /// A stored job whose expression no longer parses is skipped with an error log.
    pub async fn restore(&self, jobs: &dyn JobRepository) -> Result<usize> {
        let mut restored = 0;
        for job in jobs.find_active().await? {
            if job.schedule_type != ScheduleType::Cron {
                continue;
            }
            match self.add_job(&job).await {
                Ok(_) => restored += 1,
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to restore cron trigger"),
            }
        }
        info!(restored = restored, "Cron schedules restored");
        Ok(restored)
    }

    /// Abort every armed trigger (in-flight runs are left to finish)
    pub fn clear(&self) {
        let mut triggers = self.triggers.lock().unwrap_or_else(|p| p.into_inner());
        for (_, handle) in triggers.drain() {
            handle.abort();
        }
    }
}

async fn cron_loop(
    runner: Arc<JobRunner>,
    job: Job,
    schedule: Schedule,
    mut shutdown: ShutdownToken,
) {
    loop {
        let Some(next) = schedule.upcoming(Local).next() else {
            info!(job_id = %job.id, "Cron schedule has no further firings");
            return;
        };
        let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.wait() => {
                info!(job_id = %job.id, "Cron trigger stopped by shutdown");
                return;
            }
        }

        info!(job_id = %job.id, fire_at = %next.to_rfc3339(), "Cron trigger fired");
        match runner.submit(&job, TriggerType::Auto).await {
            // wait for this run before arming the next firing
            Ok((_, handle)) => {
                let _ = handle.await;
            }
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to start scheduled run"),
        }
    }
}

async fn once_trigger(
    runner: Arc<JobRunner>,
    job: Job,
    delay: Duration,
    mut shutdown: ShutdownToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown.wait() => return,
    }
    info!(job_id = %job.id, "One-shot trigger fired");
    if let Err(e) = runner.run_now(&job, TriggerType::Auto).await {
        error!(job_id = %job.id, error = %e, "Failed to start one-shot run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::{EngineConfig, ExecutionEngine};
    use crate::application::shutdown::shutdown_channel;
    use crate::application::tasks::TaskRegistry;
    use crate::domain::{RunStatus, TaskType};
    use crate::port::device_driver::mocks::MockDriverFactory;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::inventory::mocks::StaticInventory;
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::run_repository::mocks::InMemoryRunRepository;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::RunRepository;

    fn scheduler() -> (Scheduler, Arc<InMemoryRunRepository>) {
        let runs = Arc::new(InMemoryRunRepository::new());
        let engine = Arc::new(ExecutionEngine::new(
            runs.clone(),
            Arc::new(StaticInventory::with_names(&["sw1"])),
            Arc::new(MockDriverFactory::new()),
            TaskRegistry::standard(),
            Arc::new(SystemTimeProvider),
            EngineConfig::default(),
        ));
        let runner = Arc::new(JobRunner::new(
            engine,
            runs.clone(),
            Arc::new(SequentialIdProvider::new("run")),
            Arc::new(SystemTimeProvider),
        ));
        let (_tx, token) = shutdown_channel();
        (
            Scheduler::new(runner, Arc::new(SystemTimeProvider), token),
            runs,
        )
    }

    fn cron_job(expr: &str) -> Job {
        let mut job = Job::new_test("nightly", TaskType::Inspect);
        job.schedule_type = ScheduleType::Cron;
        job.schedule_value = Some(expr.to_string());
        job
    }

    #[test]
    fn test_parse_cron_dialects() {
        assert!(parse_cron("0 2 * * *").is_ok());
        assert!(parse_cron("*/30 * * * * *").is_ok());
        assert!(parse_cron("0 0 2 * * * 2099").is_ok());
        let err = parse_cron("invalid cron").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_parse_once_formats() {
        let at = parse_once("2030-01-02T03:04:05Z").unwrap();
        assert_eq!(at.timestamp(), 1_893_553_445);
        assert!(parse_once("2030-01-02 03:04:05").is_ok());
        assert!(parse_once("next tuesday").is_err());
    }

    #[tokio::test]
    async fn test_invalid_cron_arms_nothing() {
        let (scheduler, _) = scheduler();
        let job = cron_job("invalid cron");

        let err = scheduler.add_job(&job).await.unwrap_err();
        assert!(err.is_validation());
        assert!(scheduler.armed().is_empty());
    }

    #[tokio::test]
    async fn test_cron_armed_and_removed() {
        let (scheduler, _) = scheduler();
        let job = cron_job("0 3 * * *");

        scheduler.add_job(&job).await.unwrap();
        assert!(scheduler.is_armed(&job.id));
        assert_eq!(scheduler.armed(), vec![format!("job_{}", job.id)]);

        scheduler.remove_job(&job.id);
        assert!(!scheduler.is_armed(&job.id));
        // absent trigger is not an error
        scheduler.remove_job(&job.id);
    }

    #[tokio::test]
    async fn test_inactive_job_is_noop() {
        let (scheduler, runs) = scheduler();
        let mut job = Job::new_test("paused", TaskType::Inspect);
        job.is_active = false;

        assert_eq!(scheduler.add_job(&job).await.unwrap(), None);
        assert!(runs.list_runs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_fires_manual_run() {
        let (scheduler, runs) = scheduler();
        let job = Job::new_test("now", TaskType::Inspect);

        let run_id = scheduler.add_job(&job).await.unwrap().unwrap();
        let run = runs.find_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.trigger_type, TriggerType::Manual);
        assert!(!scheduler.is_armed(&job.id));
    }

    #[tokio::test]
    async fn test_past_once_rejected() {
        let (scheduler, _) = scheduler();
        let mut job = Job::new_test("once", TaskType::Inspect);
        job.schedule_type = ScheduleType::Once;
        job.schedule_value = Some("2001-01-01T00:00:00Z".to_string());

        assert!(scheduler.validate_schedule(&job).unwrap_err().is_validation());
        assert!(scheduler.add_job(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_once_fires_auto_run() {
        let (scheduler, runs) = scheduler();
        let mut job = Job::new_test("soon", TaskType::Inspect);
        job.schedule_type = ScheduleType::Once;
        let at = Utc::now() + chrono::Duration::milliseconds(100);
        job.schedule_value = Some(at.to_rfc3339());

        scheduler.add_job(&job).await.unwrap();
        assert!(scheduler.is_armed(&job.id));

        let mut fired = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fired = runs.list_runs(Some(&job.id), 10).await.unwrap();
            if !fired.is_empty() {
                break;
            }
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger_type, TriggerType::Auto);
    }

    #[tokio::test]
    async fn test_cron_fires_auto_runs() {
        let (scheduler, runs) = scheduler();
        let job = cron_job("* * * * * *");
        scheduler.add_job(&job).await.unwrap();

        let mut fired = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fired = runs.list_runs(Some(&job.id), 10).await.unwrap();
            if fired.len() >= 2 {
                break;
            }
        }
        scheduler.remove_job(&job.id);
        assert!(fired.len() >= 2, "cron fired {} times", fired.len());

        // the last firing may still be executing
        for _ in 0..100 {
            fired = runs.list_runs(Some(&job.id), 10).await.unwrap();
            if fired.iter().all(|r| r.status.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        for run in &fired {
            assert_eq!(run.trigger_type, TriggerType::Auto);
            assert_eq!(run.status, RunStatus::Success);
        }
    }

    #[tokio::test]
    async fn test_restore_rearms_only_active_cron() {
        let (scheduler, _) = scheduler();
        let jobs = InMemoryJobRepository::new();

        let cron = cron_job("0 4 * * *");
        let mut paused = cron_job("0 5 * * *");
        paused.is_active = false;
        let mut once = Job::new_test("once", TaskType::Inspect);
        once.schedule_type = ScheduleType::Once;
        once.schedule_value = Some("2099-01-01T00:00:00Z".to_string());
        for j in [&cron, &paused, &once] {
            jobs.insert(j).await.unwrap();
        }

        assert_eq!(scheduler.restore(&jobs).await.unwrap(), 1);
        assert_eq!(scheduler.armed(), vec![format!("job_{}", cron.id)]);
    }
}
