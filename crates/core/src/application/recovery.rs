// Startup recovery of runs left Running by a dead process
use crate::application::constants::RESTART_RECOVERY_MESSAGE;
use crate::domain::RunStatus;
use crate::port::{RunRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// On daemon startup, before any trigger is armed, finds every run still
/// marked Running and force-finalizes it through the crash path.
pub struct RecoveryService {
    runs: Arc<dyn RunRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    /// Create a new recovery service
    ///
    /// # Example
    /// ```ignore
    /// let recovery = RecoveryService::new(run_repo, time_provider);
    /// recovery.recover_orphaned_runs().await?;
    /// ```
    pub fn new(runs: Arc<dyn RunRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            runs,
            time_provider,
        }
    }

    /// Fail every orphaned Running run.
    ///
    /// Must only be called while no run can be executing (startup).
    ///
    /// # Returns
    /// Number of runs recovered
    pub async fn recover_orphaned_runs(&self) -> crate::error::Result<usize> {
        let orphaned = self.runs.find_runs_by_status(RunStatus::Running).await?;
        if orphaned.is_empty() {
            info!("No orphaned runs found");
            return Ok(0);
        }

        let now = self.time_provider.now_millis();
        let mut recovered_count = 0;
        for mut run in orphaned {
            warn!(
                run_id = %run.id,
                job_id = %run.job_id,
                started_at = run.start_time,
                hosts = run.results.hosts.len(),
                "Recovering orphaned run"
            );
            run.fail(RESTART_RECOVERY_MESSAGE, now);
            self.runs.update_run(&run).await?;
            recovered_count += 1;
        }

        info!(recovered_count = %recovered_count, "Orphaned run recovery complete");
        Ok(recovered_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobRun, ProgressStatus, TriggerType};
    use crate::port::run_repository::mocks::InMemoryRunRepository;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    #[tokio::test]
    async fn test_running_runs_are_failed_on_startup() {
        let runs = Arc::new(InMemoryRunRepository::new());

        let mut stuck = JobRun::start("stuck", "job-1", TriggerType::Auto, 1_000);
        stuck.seed_hosts(&["sw1".to_string()], &["Health inspection"]);
        stuck.results.host_mut("sw1").mark_step_started("Health inspection");
        runs.insert_run(&stuck).await.unwrap();

        let mut done = JobRun::start("done", "job-1", TriggerType::Manual, 0);
        done.seed_hosts(&["sw1".to_string()], &["x"]);
        done.fail("earlier failure", 500);
        runs.insert_run(&done).await.unwrap();

        let service = RecoveryService::new(runs.clone(), Arc::new(FixedTimeProvider::new(9_000)));
        assert_eq!(service.recover_orphaned_runs().await.unwrap(), 1);

        let stuck = runs.find_run(&"stuck".to_string()).await.unwrap().unwrap();
        assert_eq!(stuck.status, RunStatus::Failed);
        assert_eq!(stuck.end_time, Some(9_000));
        assert_eq!(
            stuck.results.system_error.as_deref(),
            Some(RESTART_RECOVERY_MESSAGE)
        );
        assert_eq!(stuck.results.hosts["sw1"].status, ProgressStatus::Failed);

        let done = runs.find_run(&"done".to_string()).await.unwrap().unwrap();
        assert_eq!(done.results.system_error.as_deref(), Some("earlier failure"));

        // idempotent
        assert_eq!(service.recover_orphaned_runs().await.unwrap(), 0);
    }
}
