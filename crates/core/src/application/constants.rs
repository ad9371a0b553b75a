// Engine constants (no magic values)
use std::time::Duration;

/// Default worker-pool ceiling: concurrent device sessions per run
pub const DEFAULT_MAX_WORKERS: usize = 100;

/// Default page size of run history listings
pub const DEFAULT_RUN_LIST_LIMIT: usize = 50;

/// Upper bound on run history listings
pub const MAX_RUN_LIST_LIMIT: usize = 1000;

/// Message recorded on runs found Running at startup
pub const RESTART_RECOVERY_MESSAGE: &str = "engine restarted while run was in progress";

/// Message recorded when the resolved device set is empty
pub const NO_DEVICES_MESSAGE: &str = "no target devices resolved from inventory";

/// Exception recorded on strict-mode hosts missing from inventory
pub const UNKNOWN_DEVICE_MESSAGE: &str = "device not found in inventory";

/// How long shutdown waits for an in-flight run
pub const RUN_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Top entries in the interface error ranking of a run summary
pub const SUMMARY_TOP_ERROR_DEVICES: usize = 10;

/// Recent Success/Partial runs scanned for the fleet inspection snapshot
pub const FLEET_SCAN_RUNS: usize = 100;
