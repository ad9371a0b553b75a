// Job Repository Port (Interface)

use crate::domain::{Job, JobId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job definitions
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// All jobs, newest first
    async fn list(&self) -> Result<Vec<Job>>;

    /// Replace a stored job definition
    ///
    /// # Errors
    /// - AppError::NotFound if the job does not exist
    async fn update(&self, job: &Job) -> Result<()>;

    /// Delete job; returns false if it did not exist
    async fn delete(&self, id: &JobId) -> Result<bool>;

    /// Jobs with `is_active == true` (schedule restore)
    async fn find_active(&self) -> Result<Vec<Job>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory job store
    #[derive(Default)]
    pub struct InMemoryJobRepository {
        jobs: Mutex<HashMap<JobId, Job>>,
    }

    impl InMemoryJobRepository {
        pub fn new() -> Self {
            Self::default()
        }

        fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            jobs
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Conflict(format!("job {} already exists", job.id)));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn list(&self) -> Result<Vec<Job>> {
            let jobs = self.jobs.lock().unwrap().values().cloned().collect();
            Ok(Self::sorted(jobs))
        }

        async fn update(&self, job: &Job) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(&job.id) {
                Some(slot) => {
                    *slot = job.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("job {}", job.id))),
            }
        }

        async fn delete(&self, id: &JobId) -> Result<bool> {
            Ok(self.jobs.lock().unwrap().remove(id).is_some())
        }

        async fn find_active(&self) -> Result<Vec<Job>> {
            let jobs = self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.is_active)
                .cloned()
                .collect();
            Ok(Self::sorted(jobs))
        }
    }
}
