// Domain Layer - Pure business logic and entities

pub mod device;
pub mod error;
pub mod job;
pub mod run;

// Re-exports
pub use device::DeviceHandle;
pub use error::DomainError;
pub use job::{trigger_key, Job, JobId, ScheduleType, TaskType};
pub use run::{
    HostResult, JobRun, ProgressStatus, RunId, RunResults, RunStatus, StepOutcome, StepResult,
    StepValue, TriggerType, is_reserved_host_name, SYSTEM_ERROR_KEY,
};
