// Job Runner - creates runs and serializes engine executions system-wide

use crate::application::engine::ExecutionEngine;
use crate::application::panic_guard::join_error_message;
use crate::domain::{Job, JobRun, RunId, TriggerType};
use crate::error::Result;
use crate::port::{IdProvider, RunRepository, TimeProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Counts runs between creation and terminal state
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(inner: &Arc<InFlight>) -> Self {
        inner.count.fetch_add(1, Ordering::SeqCst);
        Self(inner.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.count.fetch_sub(1, Ordering::SeqCst);
        self.0.idle.notify_waiters();
    }
}

/// Turns a Job + trigger into an engine execution.
///
/// Holds one process-wide lock around the whole execution body (inventory
/// resolution through finalize). A second run waits for the lock; it is
/// never rejected and never runs alongside.
pub struct JobRunner {
    engine: Arc<ExecutionEngine>,
    runs: Arc<dyn RunRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    run_lock: Arc<Mutex<()>>,
    in_flight: Arc<InFlight>,
}

impl JobRunner {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        runs: Arc<dyn RunRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            engine,
            runs,
            id_provider,
            time_provider,
            run_lock: Arc::new(Mutex::new(())),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    /// Persist a Running run and execute it in the background.
    ///
    /// Returns as soon as the run record exists.
    pub async fn run_now(&self, job: &Job, trigger: TriggerType) -> Result<RunId> {
        let (run_id, _detached) = self.submit(job, trigger).await?;
        Ok(run_id)
    }

    /// Like `run_now`, also handing back the background task.
    ///
    /// Dropping or aborting the handle's awaiter never interrupts the run.
    pub async fn submit(&self, job: &Job, trigger: TriggerType) -> Result<(RunId, JoinHandle<()>)> {
        let run = JobRun::start(
            self.id_provider.generate_id(),
            job.id.clone(),
            trigger,
            self.time_provider.now_millis(),
        );
        self.runs.insert_run(&run).await?;
        info!(run_id = %run.id, job_id = %job.id, trigger = trigger.as_str(), "Run created");

        let guard = InFlightGuard::enter(&self.in_flight);
        let engine = self.engine.clone();
        let lock = self.run_lock.clone();
        let job = job.clone();
        let run_id = run.id.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            execute_serialized(engine, lock, job, run_id).await;
        });
        Ok((run.id, handle))
    }

    /// Number of runs created but not yet terminal
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until no run is in flight, at most `grace`.
    ///
    /// Returns false if runs were still executing when the grace ran out.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.in_flight() == 0;
            }
        }
    }
}

/// Lock, execute on an isolated task, crash-finalize on panic, unlock
async fn execute_serialized(
    engine: Arc<ExecutionEngine>,
    lock: Arc<Mutex<()>>,
    job: Job,
    run_id: RunId,
) {
    debug!(run_id = %run_id, "Waiting for run lock");
    let _serial = lock.lock().await;
    debug!(run_id = %run_id, "Run lock acquired");

    let exec = {
        let engine = engine.clone();
        let run_id = run_id.clone();
        tokio::spawn(async move { engine.execute(&run_id, &job).await })
    };

    let outcome = match exec.await {
        Ok(result) => result,
        Err(join_err) => {
            let message = join_error_message(join_err);
            error!(run_id = %run_id, error = %message, "Engine task died");
            engine
                .force_fail(&run_id, &format!("engine crashed: {}", message))
                .await
        }
    };

    if let Err(e) = outcome {
        error!(run_id = %run_id, error = %e, "Run could not be finalized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::EngineConfig;
    use crate::application::tasks::{
        StepRecorder, TaskContext, TaskError, TaskFunction, TaskRegistry,
    };
    use crate::domain::{RunStatus, StepValue, TaskType};
    use crate::port::DeviceDriver;
    use crate::port::device_driver::mocks::MockDriverFactory;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::inventory::mocks::StaticInventory;
    use crate::port::run_repository::mocks::InMemoryRunRepository;
    use crate::port::time_provider::SystemTimeProvider;

    /// Blows up while the engine plans the run, before any device work
    struct ExplodingTask;

    #[async_trait::async_trait]
    impl TaskFunction for ExplodingTask {
        fn name(&self) -> &'static str {
            "Explode"
        }

        fn planned_steps(&self) -> Vec<&'static str> {
            panic!("engine bug")
        }

        async fn run(
            &self,
            _driver: &dyn DeviceDriver,
            _ctx: &TaskContext,
            _steps: &StepRecorder,
        ) -> std::result::Result<StepValue, TaskError> {
            Ok(StepValue::text("unreachable"))
        }
    }

    fn runner(
        devices: &[&str],
        delay: Duration,
    ) -> (JobRunner, Arc<InMemoryRunRepository>, Arc<MockDriverFactory>) {
        runner_with(devices, delay, TaskRegistry::standard())
    }

    fn runner_with(
        devices: &[&str],
        delay: Duration,
        registry: TaskRegistry,
    ) -> (JobRunner, Arc<InMemoryRunRepository>, Arc<MockDriverFactory>) {
        let runs = Arc::new(InMemoryRunRepository::new());
        let drivers = Arc::new(MockDriverFactory::with_delay(delay));
        let engine = Arc::new(ExecutionEngine::new(
            runs.clone(),
            Arc::new(StaticInventory::with_names(devices)),
            drivers.clone(),
            registry,
            Arc::new(SystemTimeProvider),
            EngineConfig::default(),
        ));
        let runner = JobRunner::new(
            engine,
            runs.clone(),
            Arc::new(SequentialIdProvider::new("run")),
            Arc::new(SystemTimeProvider),
        );
        (runner, runs, drivers)
    }

    #[tokio::test]
    async fn test_run_now_returns_running_run_immediately() {
        let (runner, runs, _) = runner(&["sw1"], Duration::from_millis(100));
        let job = Job::new_test("inspect", TaskType::Inspect);

        let run_id = runner.run_now(&job, TriggerType::Manual).await.unwrap();
        let run = runs.find_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(runner.in_flight(), 1);

        assert!(runner.wait_idle(Duration::from_secs(5)).await);
        let run = runs.find_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_runs_never_overlap() {
        let (runner, runs, drivers) = runner(&["sw1", "sw2"], Duration::from_millis(30));
        let mut first = Job::new_test("first", TaskType::Inspect);
        first.target_devices = vec!["sw1".to_string()];
        let mut second = Job::new_test("second", TaskType::Inspect);
        second.target_devices = vec!["sw2".to_string()];

        let a = runner.run_now(&first, TriggerType::Manual).await.unwrap();
        let b = runner.run_now(&second, TriggerType::Manual).await.unwrap();
        assert!(runner.wait_idle(Duration::from_secs(5)).await);

        let sw1 = drivers.calls_for("sw1");
        let sw2 = drivers.calls_for("sw2");
        let (first_calls, second_calls) = if sw1[0].started < sw2[0].started {
            (sw1, sw2)
        } else {
            (sw2, sw1)
        };
        let first_end = first_calls.iter().map(|c| c.finished).max().unwrap();
        let second_start = second_calls.iter().map(|c| c.started).min().unwrap();
        assert!(first_end <= second_start);

        for id in [a, b] {
            assert!(runs.find_run(&id).await.unwrap().unwrap().status.is_terminal());
        }
    }

    #[tokio::test]
    async fn test_wait_idle_times_out_on_slow_run() {
        let (runner, _, _) = runner(&["sw1"], Duration::from_millis(300));
        let job = Job::new_test("slow", TaskType::Inspect);
        runner.run_now(&job, TriggerType::Manual).await.unwrap();

        assert!(!runner.wait_idle(Duration::from_millis(20)).await);
        assert!(runner.wait_idle(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_engine_panic_fails_run() {
        let mut registry = TaskRegistry::standard();
        registry.register(TaskType::Inspect, Arc::new(ExplodingTask));
        let (runner, runs, drivers) = runner_with(&["sw1", "sw2"], Duration::ZERO, registry);
        let job = Job::new_test("inspect", TaskType::Inspect);

        let run_id = runner.run_now(&job, TriggerType::Manual).await.unwrap();
        assert!(runner.wait_idle(Duration::from_secs(5)).await);

        let run = runs.find_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.end_time.is_some());
        let message = run.results.system_error.as_deref().unwrap();
        assert!(message.starts_with("engine crashed"), "{}", message);
        assert!(message.contains("engine bug"), "{}", message);
        assert!(drivers.calls().is_empty());

        // the lock was released: the next run still executes
        let mut fine = Job::new_test("show version", TaskType::Query);
        fine.commands = vec!["show version".to_string()];
        let next = runner.run_now(&fine, TriggerType::Manual).await.unwrap();
        assert!(runner.wait_idle(Duration::from_secs(5)).await);
        let next = runs.find_run(&next).await.unwrap().unwrap();
        assert_eq!(next.status, RunStatus::Success);
    }
}
