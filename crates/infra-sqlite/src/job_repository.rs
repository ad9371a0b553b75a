// SQLite JobRepository Implementation

use crate::error::{decode_json, map_sqlx_error};
use async_trait::async_trait;
use netops_core::domain::{Job, JobId, ScheduleType, TaskType};
use netops_core::error::{AppError, Result};
use netops_core::port::JobRepository;
use sqlx::SqlitePool;

/// Job and run store over one SQLite pool.
///
/// Also implements `RunRepository` (see `run_repository.rs`).
#[derive(Clone)]
pub struct SqliteJobRepository {
    pub(crate) pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn encode_list(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, name, task_type, target_devices, commands,
                schedule_type, schedule_value, is_active,
                created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(job.task_type.as_str())
        .bind(encode_list(&job.target_devices)?)
        .bind(encode_list(&job.commands)?)
        .bind(job.schedule_type.as_str())
        .bind(&job.schedule_value)
        .bind(job.is_active)
        .bind(&job.created_by)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> =
            sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET name = ?, task_type = ?, target_devices = ?, commands = ?,
                schedule_type = ?, schedule_value = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.name)
        .bind(job.task_type.as_str())
        .bind(encode_list(&job.target_devices)?)
        .bind(encode_list(&job.commands)?)
        .bind(job.schedule_type.as_str())
        .bind(&job.schedule_value)
        .bind(job.is_active)
        .bind(job.updated_at)
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {} not found", job.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_active(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE is_active = 1
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    name: String,
    task_type: String,
    target_devices: String,
    commands: String,
    schedule_type: String,
    schedule_value: Option<String>,
    is_active: bool,
    created_by: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let task_type: TaskType = self.task_type.parse()?;
        let schedule_type: ScheduleType = self.schedule_type.parse()?;

        Ok(Job {
            id: self.id,
            name: self.name,
            task_type,
            target_devices: decode_json(&self.target_devices, "jobs.target_devices")?,
            commands: decode_json(&self.commands, "jobs.commands")?,
            schedule_type,
            schedule_value: self.schedule_value,
            is_active: self.is_active,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqliteJobRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobRepository::new(pool)
    }

    fn cron_job(name: &str) -> Job {
        let mut job = Job::new_test(name, TaskType::Query);
        job.target_devices = vec!["core-sw1".to_string(), "core-sw2".to_string()];
        job.commands = vec!["show version".to_string()];
        job.schedule_type = ScheduleType::Cron;
        job.schedule_value = Some("0 2 * * *".to_string());
        job.created_by = Some("admin".to_string());
        job
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_test_db().await;
        let job = cron_job("nightly query");

        repo.insert(&job).await.unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found, job);
        assert!(repo.find_by_id(&"missing".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_database_error() {
        let repo = setup_test_db().await;
        let job = cron_job("dup");
        repo.insert(&job).await.unwrap();

        let err = repo.insert(&job).await.unwrap_err();
        assert!(matches!(err, AppError::Database(msg) if msg.contains("Unique")));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup_test_db().await;
        let mut job = cron_job("nightly");
        repo.insert(&job).await.unwrap();

        job.is_active = false;
        job.name = "renamed".to_string();
        job.updated_at += 1;
        repo.update(&job).await.unwrap();
        assert_eq!(repo.find_by_id(&job.id).await.unwrap().unwrap(), job);

        assert!(repo.delete(&job.id).await.unwrap());
        assert!(!repo.delete(&job.id).await.unwrap());
        assert!(matches!(
            repo.update(&job).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_find_active() {
        let repo = setup_test_db().await;
        let first = cron_job("first");
        let mut second = cron_job("second");
        second.is_active = false;
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        // newest first
        assert_eq!(all[0].id, second.id);

        let active = repo.find_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
    }
}
