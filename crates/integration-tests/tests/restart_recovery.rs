//! Daemon restart: orphaned runs are failed, cron schedules come back

mod common;

use common::{job, Harness};
use netops_core::application::constants::RESTART_RECOVERY_MESSAGE;
use netops_core::application::RecoveryService;
use netops_core::domain::{JobRun, ProgressStatus, RunStatus, ScheduleType, TaskType, TriggerType};
use netops_core::port::device_driver::mocks::MockDriverFactory;
use netops_core::port::inventory::mocks::StaticInventory;
use netops_core::port::time_provider::SystemTimeProvider;
use netops_core::port::RunRepository;
use netops_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};
use std::sync::Arc;

async fn open(url: &str) -> Harness {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Harness::build(
        pool,
        Arc::new(StaticInventory::with_names(&["sw1", "sw2"])),
        MockDriverFactory::new(),
        false,
    )
}

#[tokio::test]
async fn test_restart_recovers_runs_and_schedules() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("automation.db").display());

    // First process: a cron job, an immediate job, and a run cut off mid-flight
    let (cron_job, orphan_id) = {
        let h = open(&url).await;

        let mut req = job("nightly backup", TaskType::Backup, &["sw1"]);
        req.schedule_type = ScheduleType::Cron;
        req.schedule_value = Some("0 3 * * *".to_string());
        let cron_job = h.service.create_job(req).await.unwrap().job_id;
        assert!(h.scheduler.is_armed(&cron_job));

        let once_off = h
            .service
            .create_job(job("one-off", TaskType::Inspect, &["sw2"]))
            .await
            .unwrap();
        h.finished_run(&once_off.run_id.unwrap()).await;

        let mut orphan = JobRun::start("orphan-run", cron_job.clone(), TriggerType::Auto, 1_000);
        orphan.seed_hosts(
            &["sw1".to_string(), "sw2".to_string()],
            &["Backup running configuration"],
        );
        h.runs.insert_run(&orphan).await.unwrap();

        h.scheduler.clear();
        h.repo.pool().close().await;
        (cron_job, orphan.id)
    };

    // Second process: recovery first, then schedule restore
    let h = open(&url).await;
    let recovery = RecoveryService::new(
        Arc::new(SqliteJobRepository::new(h.repo.pool().clone())),
        Arc::new(SystemTimeProvider),
    );
    assert_eq!(recovery.recover_orphaned_runs().await.unwrap(), 1);

    let run = h.service.get_run(&orphan_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.end_time.is_some());
    assert_eq!(
        run.results.system_error.as_deref(),
        Some(RESTART_RECOVERY_MESSAGE)
    );
    for host in run.results.hosts.values() {
        assert_eq!(host.status, ProgressStatus::Failed);
        assert!(!host.success);
    }

    // Nothing else was touched
    assert_eq!(recovery.recover_orphaned_runs().await.unwrap(), 0);

    assert_eq!(h.service.restore_schedules().await.unwrap(), 1);
    assert_eq!(h.scheduler.armed(), vec![format!("job_{}", cron_job)]);
    assert_eq!(h.runner.in_flight(), 0);

    h.scheduler.clear();
}
