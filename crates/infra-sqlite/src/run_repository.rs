// SQLite RunRepository Implementation
//
// job_runs holds the run header; run_hosts holds one JSON HostResult per
// (run, host) so per-host upserts from concurrent workers never clobber
// each other.

use crate::error::{decode_json, map_sqlx_error};
use crate::SqliteJobRepository;
use async_trait::async_trait;
use netops_core::domain::{
    HostResult, JobRun, RunId, RunResults, RunStatus, TriggerType,
};
use netops_core::error::{AppError, Result};
use netops_core::port::RunRepository;
use sqlx::{Sqlite, Transaction};
use std::collections::BTreeMap;

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: String,
    job_id: String,
    status: String,
    total_devices: i64,
    success_count: i64,
    failed_count: i64,
    system_error: Option<String>,
    start_time: i64,
    end_time: Option<i64>,
    duration: Option<f64>,
    trigger_type: String,
}

#[derive(Debug, sqlx::FromRow)]
struct HostRow {
    host: String,
    result: String,
}

impl RunRow {
    fn into_run(self, hosts: Vec<HostRow>) -> Result<JobRun> {
        let status: RunStatus = self.status.parse()?;
        let trigger_type: TriggerType = self.trigger_type.parse()?;

        let hosts = hosts
            .into_iter()
            .map(|row| {
                let result: HostResult = decode_json(&row.result, "run_hosts.result")?;
                Ok((row.host, result))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(JobRun {
            id: self.id,
            job_id: self.job_id,
            status,
            total_devices: self.total_devices as u32,
            success_count: self.success_count as u32,
            failed_count: self.failed_count as u32,
            results: RunResults {
                system_error: self.system_error,
                hosts,
            },
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
            trigger_type,
        })
    }
}

impl SqliteJobRepository {
    async fn load_hosts(&self, run_id: &str) -> Result<Vec<HostRow>> {
        sqlx::query_as("SELECT host, result FROM run_hosts WHERE run_id = ? ORDER BY host")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn hydrate(&self, rows: Vec<RunRow>) -> Result<Vec<JobRun>> {
        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let hosts = self.load_hosts(&row.id).await?;
            runs.push(row.into_run(hosts)?);
        }
        Ok(runs)
    }
}

async fn write_hosts(
    tx: &mut Transaction<'_, Sqlite>,
    run_id: &str,
    hosts: &BTreeMap<String, HostResult>,
) -> Result<()> {
    for (host, result) in hosts {
        sqlx::query(
            r#"
            INSERT INTO run_hosts (run_id, host, result) VALUES (?, ?, ?)
            ON CONFLICT(run_id, host) DO UPDATE SET result = excluded.result
            "#,
        )
        .bind(run_id)
        .bind(host)
        .bind(serde_json::to_string(result)?)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }
    Ok(())
}

#[async_trait]
impl RunRepository for SqliteJobRepository {
    async fn insert_run(&self, run: &JobRun) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO job_runs (
                id, job_id, status, total_devices, success_count, failed_count,
                system_error, start_time, end_time, duration, trigger_type
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.job_id)
        .bind(run.status.as_str())
        .bind(run.total_devices as i64)
        .bind(run.success_count as i64)
        .bind(run.failed_count as i64)
        .bind(&run.results.system_error)
        .bind(run.start_time)
        .bind(run.end_time)
        .bind(run.duration)
        .bind(run.trigger_type.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        write_hosts(&mut tx, &run.id, &run.results.hosts).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_run(&self, id: &RunId) -> Result<Option<JobRun>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM job_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let hosts = self.load_hosts(&row.id).await?;
                Ok(Some(row.into_run(hosts)?))
            }
            None => Ok(None),
        }
    }

    async fn find_host_result(&self, run_id: &RunId, host: &str) -> Result<Option<HostResult>> {
        let row: Option<HostRow> =
            sqlx::query_as("SELECT host, result FROM run_hosts WHERE run_id = ? AND host = ?")
                .bind(run_id)
                .bind(host)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.map(|row| decode_json(&row.result, "run_hosts.result"))
            .transpose()
    }

    async fn update_run(&self, run: &JobRun) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET status = ?, total_devices = ?, success_count = ?, failed_count = ?,
                system_error = ?, end_time = ?, duration = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.total_devices as i64)
        .bind(run.success_count as i64)
        .bind(run.failed_count as i64)
        .bind(&run.results.system_error)
        .bind(run.end_time)
        .bind(run.duration)
        .bind(&run.id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Run {} not found", run.id)));
        }

        write_hosts(&mut tx, &run.id, &run.results.hosts).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn upsert_host_result(
        &self,
        run_id: &RunId,
        host: &str,
        result: &HostResult,
    ) -> Result<()> {
        // single statement: atomic per (run_id, host)
        sqlx::query(
            r#"
            INSERT INTO run_hosts (run_id, host, result) VALUES (?, ?, ?)
            ON CONFLICT(run_id, host) DO UPDATE SET result = excluded.result
            "#,
        )
        .bind(run_id)
        .bind(host)
        .bind(serde_json::to_string(result)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_runs(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<JobRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT * FROM job_runs
            WHERE (?1 IS NULL OR job_id = ?1)
            ORDER BY start_time DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(job_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.hydrate(rows).await
    }

    async fn list_recent_runs(&self, statuses: &[RunStatus], limit: usize) -> Result<Vec<JobRun>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT * FROM job_runs WHERE status IN ({}) ORDER BY start_time DESC, id DESC LIMIT ?",
            placeholders
        );

        let mut query = sqlx::query_as::<_, RunRow>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        self.hydrate(rows).await
    }

    async fn find_runs_by_status(&self, status: RunStatus) -> Result<Vec<JobRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT * FROM job_runs
            WHERE status = ?
            ORDER BY start_time ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.hydrate(rows).await
    }

    async fn delete_run(&self, id: &RunId) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM run_hosts WHERE run_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let result = sqlx::query("DELETE FROM job_runs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
