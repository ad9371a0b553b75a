// NAPALM command-line driver
//
// Every capability is one `napalm` invocation:
//   napalm --vendor <platform> --user <u> --password <p> [--optional_args ..] <host> call <getter>
//   napalm ... <host> configure <file> --strategy merge
// Children run with an allowlisted environment and a per-call timeout; a hung
// child gets SIGTERM, then SIGKILL after the grace period.

use crate::config::NapalmConfig;
use async_trait::async_trait;
use netops_core::domain::DeviceHandle;
use netops_core::port::{DeviceDriver, DriverError, DriverFactory, InterfaceData};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Stderr markers of transport-level failures
const CONNECTION_MARKERS: &[&str] = &[
    "ConnectionException",
    "ConnectionClosedException",
    "NetMikoTimeoutException",
    "NetmikoTimeoutException",
    "AuthenticationException",
    "NetMikoAuthenticationException",
    "Connection refused",
    "No route to host",
    "timed out",
];

/// Builds one CLI driver per device
pub struct NapalmDriverFactory {
    config: Arc<NapalmConfig>,
}

impl NapalmDriverFactory {
    pub fn new(config: NapalmConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl DriverFactory for NapalmDriverFactory {
    fn create(&self, device: &DeviceHandle) -> Result<Box<dyn DeviceDriver>, DriverError> {
        if device.hostname.trim().is_empty() {
            return Err(DriverError::Connection(format!(
                "{}: no address configured",
                device.name
            )));
        }
        if device.platform.trim().is_empty() {
            return Err(DriverError::Connection(format!(
                "{}: no platform configured",
                device.name
            )));
        }
        Ok(Box::new(NapalmCliDriver::new(
            device.clone(),
            self.config.clone(),
        )))
    }
}

/// Captured child output
struct CliOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

pub struct NapalmCliDriver {
    device: DeviceHandle,
    config: Arc<NapalmConfig>,
}

impl NapalmCliDriver {
    pub fn new(device: DeviceHandle, config: Arc<NapalmConfig>) -> Self {
        Self { device, config }
    }

    /// Filter the process environment to the allowlist
    fn filter_env(&self, env: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        env.filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    /// Driver failure with the device credentials masked.
    ///
    /// The driver may echo its argv (which carries the credentials) in a
    /// traceback, and failure text ends up in persisted run results.
    fn failure(&self, output: &CliOutput) -> DriverError {
        let mut stderr = output.stderr.clone();
        let mut stdout = output.stdout.clone();
        let credentials = [Some(self.device.password.as_str()), self.device.secret.as_deref()];
        for credential in credentials.into_iter().flatten().filter(|c| !c.is_empty()) {
            stderr = stderr.replace(credential, REDACTED);
            stdout = stdout.replace(credential, REDACTED);
        }
        classify_failure(&stderr, &stdout)
    }

    /// Connection arguments shared by every invocation.
    ///
    /// The NAPALM CLI only takes credentials on its command line, so they
    /// are visible in the host's process table for the life of the call.
    fn connection_args(&self) -> Vec<String> {
        let d = &self.device;
        let mut args = vec![
            "--vendor".to_string(),
            d.platform.clone(),
            "--user".to_string(),
            d.username.clone(),
            "--password".to_string(),
            d.password.clone(),
        ];

        let mut optional = Vec::new();
        if let Some(port) = d.port {
            optional.push(format!("port={}", port));
        }
        if let Some(secret) = d.secret.as_deref() {
            optional.push(format!("secret={}", secret));
        }
        if let Some(transport) = d.connection_type.as_deref() {
            optional.push(format!("transport={}", transport));
        }
        if !optional.is_empty() {
            args.push("--optional_args".to_string());
            args.push(optional.join(","));
        }

        args.push(d.hostname.clone());
        args
    }

    /// Spawn the driver and wait for it, bounded by the configured timeout
    async fn invoke(&self, action: &[String]) -> Result<CliOutput, DriverError> {
        let mut args = self.connection_args();
        args.extend_from_slice(action);

        let started = Instant::now();
        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DriverError::Spawn(format!("{}: {}", self.config.binary.display(), e))
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match timeout(self.config.timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| DriverError::Io(e.to_string()))?,
            Err(_) => {
                warn!(
                    device = %self.device.name,
                    action = %action.join(" "),
                    timeout_secs = self.config.timeout.as_secs(),
                    "Driver call timed out, terminating"
                );
                terminate(&mut child, self.config.kill_grace).await;
                return Err(DriverError::Timeout(self.config.timeout.as_secs()));
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        debug!(
            device = %self.device.name,
            action = %action.first().map(String::as_str).unwrap_or_default(),
            exit_code = ?status.code(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Driver call finished"
        );

        Ok(CliOutput {
            success: status.success(),
            stdout,
            stderr,
        })
    }

    /// Run a getter and parse its JSON result
    async fn call(&self, method: &str, kwargs: Option<String>) -> Result<Value, DriverError> {
        let mut action = vec!["call".to_string(), method.to_string()];
        if let Some(kwargs) = kwargs {
            action.push("--method-kwargs".to_string());
            action.push(kwargs);
        }

        let output = self.invoke(&action).await?;
        if !output.success {
            return Err(self.failure(&output));
        }
        parse_json(&output.stdout)
    }
}

/// Read a child pipe to completion on its own task
fn drain<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// SIGTERM, wait `grace`, then SIGKILL
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && timeout(grace, child.wait()).await.is_ok()
            {
                info!(pid, "Driver process exited after SIGTERM");
                return;
            }
            warn!(pid, "Driver process ignored SIGTERM, sending SIGKILL");
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill driver process");
    }
}

const REDACTED: &str = "***";

fn classify_failure(stderr: &str, stdout: &str) -> DriverError {
    let detail = last_meaningful_line(stderr)
        .or_else(|| last_meaningful_line(stdout))
        .unwrap_or("driver exited with an error")
        .to_string();

    if CONNECTION_MARKERS.iter().any(|m| stderr.contains(m)) {
        DriverError::Connection(detail)
    } else {
        DriverError::Command(detail)
    }
}

fn last_meaningful_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

/// Parse driver stdout, skipping any log noise printed before the JSON body
fn parse_json(stdout: &str) -> Result<Value, DriverError> {
    let trimmed = stdout.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    trimmed
        .find(['{', '['])
        .and_then(|start| serde_json::from_str(&trimmed[start..]).ok())
        .ok_or_else(|| {
            let preview: String = trimmed.chars().take(200).collect();
            DriverError::Parse(format!("expected JSON, got: {}", preview))
        })
}

/// `commands=[...]` keyword argument for the `cli` getter
fn cli_kwargs(command: &str) -> String {
    format!("commands={}", json!([command]))
}

#[async_trait]
impl DeviceDriver for NapalmCliDriver {
    fn device(&self) -> &DeviceHandle {
        &self.device
    }

    async fn fetch_facts(&self) -> Result<Value, DriverError> {
        self.call("get_facts", None).await
    }

    async fn fetch_environment(&self) -> Result<Value, DriverError> {
        self.call("get_environment", None).await
    }

    async fn fetch_interfaces(&self) -> Result<InterfaceData, DriverError> {
        let interfaces = self.call("get_interfaces", None).await?;
        let counters = self.call("get_interfaces_counters", None).await?;
        Ok(InterfaceData {
            interfaces,
            counters,
        })
    }

    async fn fetch_running_config(&self) -> Result<String, DriverError> {
        let config = self
            .call("get_config", Some("retrieve='running'".to_string()))
            .await?;
        config
            .get("running")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Parse("get_config returned no running config".into()))
    }

    async fn run_command(&self, command: &str) -> Result<String, DriverError> {
        let output = self.call("cli", Some(cli_kwargs(command))).await?;
        match output.get(command) {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(DriverError::Parse(format!(
                "no output returned for '{}'",
                command
            ))),
        }
    }

    async fn apply_config(&self, commands: &[String]) -> Result<Value, DriverError> {
        let mut candidate =
            tempfile::NamedTempFile::new().map_err(|e| DriverError::Io(e.to_string()))?;
        for line in commands {
            writeln!(candidate, "{}", line).map_err(|e| DriverError::Io(e.to_string()))?;
        }
        candidate
            .flush()
            .map_err(|e| DriverError::Io(e.to_string()))?;

        let mut action = vec![
            "configure".to_string(),
            candidate.path().display().to_string(),
        ];
        if self.config.merge_config {
            action.push("--strategy".to_string());
            action.push("merge".to_string());
        }

        let output = self.invoke(&action).await?;
        if !output.success {
            return Err(self.failure(&output));
        }
        info!(device = %self.device.name, lines = commands.len(), "Configuration applied");
        Ok(json!({
            "applied": commands.len(),
            "diff": output.stdout.trim(),
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Fake `napalm` answering by getter name
    const FAKE_NAPALM: &str = r#"#!/bin/sh
case "$*" in
  *"call get_facts"*) echo '{"hostname": "sw1", "model": "C9300", "os_version": "17.3", "uptime": 3600, "serial_number": "FOC1"}' ;;
  *"call get_environment"*) echo 'WARNING noisy banner'; echo '{"cpu": {"0": {"%usage": 7.0}}}' ;;
  *"call get_interfaces_counters"*) echo '{"Gi0/1": {"rx_errors": 2, "tx_errors": 0}}' ;;
  *"call get_interfaces"*) echo '{"Gi0/1": {"is_up": true}}' ;;
  *"call get_config"*) printf '%s\n' '{"running": "hostname sw1\n", "startup": "", "candidate": ""}' ;;
  *"call cli"*) echo '{"show version": "Cisco IOS XE"}' ;;
  *"configure"*)
    for f in "$@"; do if [ -f "$f" ]; then cat "$f"; fi; done ;;
  *) echo "unknown invocation" >&2; exit 2 ;;
esac
"#;

    fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("napalm");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn driver(binary: &Path, timeout: Duration) -> Box<dyn DeviceDriver> {
        let mut device = DeviceHandle::new("sw1", "10.0.0.1", "ios");
        device.username = "admin".to_string();
        device.password = "pw".to_string();
        device.port = Some(22);
        let mut config = NapalmConfig::new(binary, timeout);
        config.kill_grace = Duration::from_millis(200);
        NapalmDriverFactory::new(config).create(&device).unwrap()
    }

    #[tokio::test]
    async fn test_getters_parse_json() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), FAKE_NAPALM);
        let driver = driver(&bin, Duration::from_secs(10));

        let facts = driver.fetch_facts().await.unwrap();
        assert_eq!(facts["model"], "C9300");

        // banner before the JSON body is skipped
        let env = driver.fetch_environment().await.unwrap();
        assert_eq!(env["cpu"]["0"]["%usage"], 7.0);

        let intf = driver.fetch_interfaces().await.unwrap();
        assert_eq!(intf.interfaces["Gi0/1"]["is_up"], true);
        assert_eq!(intf.counters["Gi0/1"]["rx_errors"], 2);

        assert_eq!(driver.fetch_running_config().await.unwrap(), "hostname sw1\n");
        assert_eq!(
            driver.run_command("show version").await.unwrap(),
            "Cisco IOS XE"
        );
        assert!(matches!(
            driver.run_command("show clock").await,
            Err(DriverError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_config_passes_candidate_file() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), FAKE_NAPALM);
        let driver = driver(&bin, Duration::from_secs(10));

        let result = driver
            .apply_config(&["interface Gi0/1".to_string(), " shutdown".to_string()])
            .await
            .unwrap();
        assert_eq!(result["applied"], 2);
        assert!(result["diff"].as_str().unwrap().contains("interface Gi0/1"));
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(
            dir.path(),
            "#!/bin/sh\necho 'Traceback'>&2\necho 'napalm.base.exceptions.ConnectionException: Cannot connect to 10.0.0.1' >&2\nexit 1\n",
        );
        let err = driver(&bin, Duration::from_secs(10))
            .fetch_facts()
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Connection(msg) if msg.contains("Cannot connect")));

        let bin = write_script(dir.path(), "#!/bin/sh\necho 'Invalid input detected' >&2\nexit 1\n");
        let err = driver(&bin, Duration::from_secs(10))
            .fetch_facts()
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Command(_)));
    }

    #[tokio::test]
    async fn test_failure_text_masks_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "#!/bin/sh\necho \"bad invocation: $*\" >&2\nexit 1\n");
        let mut device = DeviceHandle::new("sw1", "10.0.0.1", "ios");
        device.username = "admin".to_string();
        device.password = "hunter2".to_string();
        device.secret = Some("enable-me".to_string());
        let driver = NapalmDriverFactory::new(NapalmConfig::new(&bin, Duration::from_secs(10)))
            .create(&device)
            .unwrap();

        let message = driver.fetch_facts().await.unwrap_err().to_string();
        assert!(message.contains("bad invocation"));
        assert!(!message.contains("hunter2"), "{}", message);
        assert!(!message.contains("enable-me"), "{}", message);
        assert!(message.contains(REDACTED));
    }

    #[tokio::test]
    async fn test_hung_driver_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "#!/bin/sh\ntrap '' TERM\nsleep 30\n");
        let started = Instant::now();

        let err = driver(&bin, Duration::from_millis(300))
            .fetch_facts()
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let err = driver(Path::new("/nonexistent/napalm"), Duration::from_secs(1))
            .fetch_facts()
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Spawn(_)));
    }

    #[test]
    fn test_env_filtering() {
        let driver = NapalmCliDriver::new(
            DeviceHandle::new("sw1", "10.0.0.1", "ios"),
            Arc::new(NapalmConfig::default()),
        );
        let env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("AWS_SECRET_ACCESS_KEY".to_string(), "x".to_string()),
        ];
        let filtered = driver.filter_env(env.into_iter());
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("PATH"));
    }

    #[test]
    fn test_factory_rejects_unconnectable_device() {
        let factory = NapalmDriverFactory::new(NapalmConfig::default());
        let device = DeviceHandle::new("sw1", "", "ios");
        assert!(matches!(
            factory.create(&device),
            Err(DriverError::Connection(_))
        ));
    }

    #[test]
    fn test_connection_args() {
        let mut device = DeviceHandle::new("sw1", "10.0.0.1", "eos");
        device.username = "admin".to_string();
        device.secret = Some("en".to_string());
        device.port = Some(8022);
        let driver = NapalmCliDriver::new(device, Arc::new(NapalmConfig::default()));

        let args = driver.connection_args();
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.1"));
        assert!(args.windows(2).any(|w| w[0] == "--optional_args" && w[1] == "port=8022,secret=en"));
        assert!(args.windows(2).any(|w| w[0] == "--vendor" && w[1] == "eos"));
    }
}
