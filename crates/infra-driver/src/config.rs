// Driver configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default per-call device timeout
pub const DEFAULT_DRIVER_TIMEOUT: Duration = Duration::from_secs(60);

/// Time a timed-out child gets between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Environment variables passed through to the driver process
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "LC_ALL",
    "PYTHONPATH",
    "VIRTUAL_ENV",
    "SSL_CERT_FILE",
];

/// Settings of the `napalm` command-line driver.
///
/// Device credentials travel on the child's argv (the CLI accepts them no
/// other way), so any local user who can list processes can read them while
/// a call is in flight. Run the daemon on a host without untrusted local
/// users. Failure text is masked before it reaches run results.
#[derive(Debug, Clone)]
pub struct NapalmConfig {
    /// `napalm` executable (looked up on PATH when relative)
    pub binary: PathBuf,
    /// Bound on every driver call
    pub timeout: Duration,
    pub kill_grace: Duration,
    /// Only these variables of the daemon's environment reach the child
    pub env_allowlist: Vec<String>,
    /// Candidate merge instead of replace on `configure`
    pub merge_config: bool,
}

impl Default for NapalmConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("napalm"),
            timeout: DEFAULT_DRIVER_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            merge_config: true,
        }
    }
}

impl NapalmConfig {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            ..Self::default()
        }
    }
}
