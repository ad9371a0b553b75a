// NetOps Infrastructure - Device Driver Adapter
// Implements: DriverFactory, DeviceDriver over the NAPALM command-line tool

pub mod config;
pub mod napalm_driver;

pub use config::NapalmConfig;
pub use napalm_driver::{NapalmCliDriver, NapalmDriverFactory};
