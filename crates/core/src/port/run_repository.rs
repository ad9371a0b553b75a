// Run Repository Port (JobRun history + live progress)

use crate::domain::{HostResult, JobRun, RunId, RunStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for JobRun records
///
/// Runs are read while being written: pollers call `find_run` on a Running
/// record while workers stream host updates into it.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Persist a freshly started run
    async fn insert_run(&self, run: &JobRun) -> Result<()>;

    /// Load a run with all host results
    async fn find_run(&self, id: &RunId) -> Result<Option<JobRun>>;

    /// Load one host's latest result; None when that host has no record yet
    async fn find_host_result(&self, run_id: &RunId, host: &str) -> Result<Option<HostResult>>;

    /// Write status, counters, timestamps and the full `results` mapping
    async fn update_run(&self, run: &JobRun) -> Result<()>;

    /// Store one host's result, leaving every other host untouched.
    ///
    /// Must be atomic per `(run_id, host)` so workers of the same run can
    /// interleave without lost updates.
    async fn upsert_host_result(&self, run_id: &RunId, host: &str, result: &HostResult)
        -> Result<()>;

    /// Runs newest first, optionally for one job
    async fn list_runs(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<JobRun>>;

    /// Newest runs whose status is one of `statuses`, at most `limit`
    async fn list_recent_runs(&self, statuses: &[RunStatus], limit: usize) -> Result<Vec<JobRun>>;

    /// Runs in a given status (startup recovery)
    async fn find_runs_by_status(&self, status: RunStatus) -> Result<Vec<JobRun>>;

    /// Delete run; returns false if it did not exist
    async fn delete_run(&self, id: &RunId) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory run store
    #[derive(Default)]
    pub struct InMemoryRunRepository {
        runs: Mutex<HashMap<RunId, JobRun>>,
        host_writes: Mutex<usize>,
        host_reads: Mutex<usize>,
        full_reads: Mutex<usize>,
    }

    impl InMemoryRunRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of `upsert_host_result` calls so far
        pub fn host_write_count(&self) -> usize {
            *self.host_writes.lock().unwrap()
        }

        /// Number of `find_host_result` calls so far
        pub fn host_read_count(&self) -> usize {
            *self.host_reads.lock().unwrap()
        }

        /// Number of `find_run` calls so far
        pub fn full_read_count(&self) -> usize {
            *self.full_reads.lock().unwrap()
        }
    }

    #[async_trait]
    impl RunRepository for InMemoryRunRepository {
        async fn insert_run(&self, run: &JobRun) -> Result<()> {
            let mut runs = self.runs.lock().unwrap();
            if runs.contains_key(&run.id) {
                return Err(AppError::Conflict(format!("run {} already exists", run.id)));
            }
            runs.insert(run.id.clone(), run.clone());
            Ok(())
        }

        async fn find_run(&self, id: &RunId) -> Result<Option<JobRun>> {
            *self.full_reads.lock().unwrap() += 1;
            Ok(self.runs.lock().unwrap().get(id).cloned())
        }

        async fn find_host_result(
            &self,
            run_id: &RunId,
            host: &str,
        ) -> Result<Option<HostResult>> {
            *self.host_reads.lock().unwrap() += 1;
            Ok(self
                .runs
                .lock()
                .unwrap()
                .get(run_id)
                .and_then(|r| r.results.hosts.get(host).cloned()))
        }

        async fn update_run(&self, run: &JobRun) -> Result<()> {
            let mut runs = self.runs.lock().unwrap();
            match runs.get_mut(&run.id) {
                Some(slot) => {
                    *slot = run.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("run {}", run.id))),
            }
        }

        async fn upsert_host_result(
            &self,
            run_id: &RunId,
            host: &str,
            result: &HostResult,
        ) -> Result<()> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .get_mut(run_id)
                .ok_or_else(|| AppError::NotFound(format!("run {}", run_id)))?;
            run.results.hosts.insert(host.to_string(), result.clone());
            *self.host_writes.lock().unwrap() += 1;
            Ok(())
        }

        async fn list_runs(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<JobRun>> {
            let mut runs: Vec<JobRun> = self
                .runs
                .lock()
                .unwrap()
                .values()
                .filter(|r| job_id.map_or(true, |j| r.job_id == j))
                .cloned()
                .collect();
            runs.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
            runs.truncate(limit);
            Ok(runs)
        }

        async fn list_recent_runs(
            &self,
            statuses: &[RunStatus],
            limit: usize,
        ) -> Result<Vec<JobRun>> {
            let mut runs: Vec<JobRun> = self
                .runs
                .lock()
                .unwrap()
                .values()
                .filter(|r| statuses.contains(&r.status))
                .cloned()
                .collect();
            runs.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
            runs.truncate(limit);
            Ok(runs)
        }

        async fn find_runs_by_status(&self, status: RunStatus) -> Result<Vec<JobRun>> {
            Ok(self
                .runs
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.status == status)
                .cloned()
                .collect())
        }

        async fn delete_run(&self, id: &RunId) -> Result<bool> {
            Ok(self.runs.lock().unwrap().remove(id).is_some())
        }
    }
}
