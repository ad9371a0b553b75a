//! Task Library - named task functions built from driver calls
//!
//! Each task runs against one device session and reports its internal steps
//! through a [`StepRecorder`]. The engine wraps every task in one top-level
//! step named [`TaskFunction::name`].

mod backup;
mod config;
mod inspect;
mod query;

pub use backup::BackupTask;
pub use config::ApplyConfigTask;
pub use inspect::{HealthReport, InspectTask};
pub use query::QueryTask;

use crate::domain::{StepOutcome, StepValue, TaskType};
use crate::port::{DeviceDriver, DriverError, ProgressObserver, TimeProvider};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Task failure (becomes StepResult/HostResult data, never escapes a worker)
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{step}: {source}")]
    Step {
        step: String,
        #[source]
        source: DriverError,
    },

    #[error("{failed} of {total} commands failed")]
    CommandsFailed {
        failed: usize,
        total: usize,
        output: String,
    },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Partial output worth keeping on the failed step
    pub fn partial_output(&self) -> Option<StepValue> {
        match self {
            TaskError::CommandsFailed { output, .. } => Some(StepValue::text(output.clone())),
            _ => None,
        }
    }
}

/// Per-run inputs shared by every device worker
pub struct TaskContext {
    pub commands: Vec<String>,
    pub backup_dir: PathBuf,
    pub time_provider: Arc<dyn TimeProvider>,
}

/// Emits step boundaries for one host
#[derive(Clone)]
pub struct StepRecorder {
    host: String,
    observer: Arc<dyn ProgressObserver>,
}

impl StepRecorder {
    pub fn new(host: impl Into<String>, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            host: host.into(),
            observer,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn started(&self, step: &str) {
        self.observer.on_step_started(&self.host, step).await;
    }

    pub async fn completed(&self, step: &str, outcome: StepOutcome) {
        self.observer
            .on_step_completed(&self.host, step, outcome)
            .await;
    }

    /// Run one driver call as a named step.
    ///
    /// The start event is delivered before the call, the completion event
    /// before this returns.
    pub async fn step<T, Fut>(&self, name: &str, call: Fut) -> Result<T, TaskError>
    where
        T: Serialize + std::fmt::Debug,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        self.started(name).await;
        match call.await {
            Ok(value) => {
                self.completed(name, StepOutcome::success(Some(StepValue::coerce(&value))))
                    .await;
                Ok(value)
            }
            Err(source) => {
                self.completed(name, StepOutcome::failure(source.to_string(), None))
                    .await;
                Err(TaskError::Step {
                    step: name.to_string(),
                    source,
                })
            }
        }
    }
}

/// A named task runnable against one device session
#[async_trait]
pub trait TaskFunction: Send + Sync {
    /// Top-level step label
    fn name(&self) -> &'static str;

    /// Internal step labels, in execution order
    fn internal_steps(&self) -> &'static [&'static str] {
        &[]
    }

    /// Every step seeded as pending before dispatch (internal + top-level)
    fn planned_steps(&self) -> Vec<&'static str> {
        let mut steps = self.internal_steps().to_vec();
        steps.push(self.name());
        steps
    }

    async fn run(
        &self,
        driver: &dyn DeviceDriver,
        ctx: &TaskContext,
        steps: &StepRecorder,
    ) -> Result<StepValue, TaskError>;
}

/// Registry mapping task type -> task function
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskType, Arc<dyn TaskFunction>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect, Backup, Query and Config
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(TaskType::Inspect, Arc::new(InspectTask));
        registry.register(TaskType::Backup, Arc::new(BackupTask));
        registry.register(TaskType::Query, Arc::new(QueryTask));
        registry.register(TaskType::Config, Arc::new(ApplyConfigTask));
        registry
    }

    pub fn register(&mut self, task_type: TaskType, task: Arc<dyn TaskFunction>) {
        self.tasks.insert(task_type, task);
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskFunction>> {
        self.tasks.get(&task_type).cloned()
    }
}
