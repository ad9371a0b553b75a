// Application Layer - Use Cases, Scheduling and Execution

pub mod constants;
pub mod engine;
pub mod panic_guard;
pub mod recovery;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod summary;
pub mod tasks;

// Re-exports
pub use engine::{EngineConfig, ExecutionEngine};
pub use recovery::RecoveryService;
pub use runner::JobRunner;
pub use scheduler::Scheduler;
pub use service::{AutomationService, JobCreated, JobUpdate, NewJob, QuickTask, QuickTaskStarted};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use summary::{FleetSummary, RunSummary};
pub use tasks::TaskRegistry;
