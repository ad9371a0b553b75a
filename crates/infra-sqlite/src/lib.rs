// NetOps Infrastructure - SQLite Adapter
// Implements: JobRepository, RunRepository, DeviceInventory

mod connection;
mod error;
mod inventory;
mod job_repository;
mod migration;
mod run_repository;

pub use connection::create_pool;
pub use error::map_sqlx_error;
pub use inventory::SqliteDeviceInventory;
pub use job_repository::SqliteJobRepository;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by `map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
