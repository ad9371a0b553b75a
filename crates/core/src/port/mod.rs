// Port Layer - Interfaces for external dependencies

pub mod device_driver;
pub mod id_provider; // For deterministic testing
pub mod inventory;
pub mod job_repository;
pub mod progress;
pub mod run_repository;
pub mod time_provider;

// Re-exports
pub use device_driver::{DeviceDriver, DriverError, DriverFactory, InterfaceData};
pub use id_provider::IdProvider;
pub use inventory::DeviceInventory;
pub use job_repository::JobRepository;
pub use progress::ProgressObserver;
pub use run_repository::RunRepository;
pub use time_provider::TimeProvider;
