// Device Driver Port
// Per-device protocol capability the Task Library is built from

use crate::domain::DeviceHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Driver errors (fatal to one device only)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Device call timed out after {0}s")]
    Timeout(u64),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Unparseable device output: {0}")]
    Parse(String),

    #[error("Spawn failed: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Interface table plus per-interface counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceData {
    pub interfaces: Value,
    pub counters: Value,
}

/// Device session
///
/// One instance per device per run. Every call may fail with a transport
/// or timeout error; implementations bound each call with their own timeout.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Device this session talks to
    fn device(&self) -> &DeviceHandle;

    /// Connect and gather facts (hostname, model, os_version, uptime, serial_number)
    async fn fetch_facts(&self) -> Result<Value, DriverError>;

    /// CPU, memory, fans, power, temperature
    async fn fetch_environment(&self) -> Result<Value, DriverError>;

    async fn fetch_interfaces(&self) -> Result<InterfaceData, DriverError>;

    async fn fetch_running_config(&self) -> Result<String, DriverError>;

    async fn run_command(&self, command: &str) -> Result<String, DriverError>;

    /// Push a configuration command set in one call
    async fn apply_config(&self, commands: &[String]) -> Result<Value, DriverError>;
}

/// Creates a driver session per resolved device
pub trait DriverFactory: Send + Sync {
    fn create(&self, device: &DeviceHandle) -> Result<Box<dyn DeviceDriver>, DriverError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Driver operation (for scripting failures)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MockOp {
        Facts,
        Environment,
        Interfaces,
        RunningConfig,
        Command,
        ApplyConfig,
    }

    /// Mock driver behavior
    #[derive(Debug, Clone, PartialEq)]
    pub enum MockBehavior {
        /// Every call succeeds
        Success,
        /// Calls to `op` fail with a connection error
        FailOn(MockOp, String),
        /// Calls to `op` panic (for panic isolation testing)
        PanicOn(MockOp, String),
        /// Creating the session fails (device unreachable)
        Unreachable(String),
    }

    /// One recorded device call: device, op, start, end
    #[derive(Debug, Clone)]
    pub struct CallRecord {
        pub device: String,
        pub op: MockOp,
        pub started: Instant,
        pub finished: Instant,
    }

    /// Script for one device
    #[derive(Debug, Clone)]
    pub struct DeviceScript {
        pub behavior: MockBehavior,
        pub delay: Duration,
        pub environment: Value,
        pub command_outputs: HashMap<String, String>,
        pub running_config: String,
    }

    impl Default for DeviceScript {
        fn default() -> Self {
            Self {
                behavior: MockBehavior::Success,
                delay: Duration::ZERO,
                environment: default_environment(),
                command_outputs: HashMap::new(),
                running_config: "sysname mock\n#\nreturn\n".to_string(),
            }
        }
    }

    pub fn default_environment() -> Value {
        json!({
            "cpu": {"0": {"%usage": 12.0}},
            "memory": {"used_ram": 256, "available_ram": 1024, "total_ram": 1024},
            "fans": {"fan1": {"status": true}},
            "power": {"psu1": {"status": true}},
            "temperature": {"board": {"temperature": 41.0, "is_alert": false, "is_critical": false}}
        })
    }

    /// Factory handing out scripted drivers, recording every call
    #[derive(Default)]
    pub struct MockDriverFactory {
        scripts: Mutex<HashMap<String, DeviceScript>>,
        default_delay: Duration,
        calls: Arc<Mutex<Vec<CallRecord>>>,
    }

    impl MockDriverFactory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every unscripted device sleeps `delay` per call
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                default_delay: delay,
                ..Self::default()
            }
        }

        pub fn script(&self, device: &str, script: DeviceScript) {
            self.scripts
                .lock()
                .unwrap()
                .insert(device.to_string(), script);
        }

        pub fn set_behavior(&self, device: &str, behavior: MockBehavior) {
            let mut scripts = self.scripts.lock().unwrap();
            let entry = scripts.entry(device.to_string()).or_insert_with(|| DeviceScript {
                delay: self.default_delay,
                ..DeviceScript::default()
            });
            entry.behavior = behavior;
        }

        pub fn calls(&self) -> Vec<CallRecord> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_for(&self, device: &str) -> Vec<CallRecord> {
            self.calls()
                .into_iter()
                .filter(|c| c.device == device)
                .collect()
        }
    }

    impl DriverFactory for MockDriverFactory {
        fn create(&self, device: &DeviceHandle) -> Result<Box<dyn DeviceDriver>, DriverError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&device.name)
                .cloned()
                .unwrap_or_else(|| DeviceScript {
                    delay: self.default_delay,
                    ..DeviceScript::default()
                });
            if let MockBehavior::Unreachable(msg) = &script.behavior {
                return Err(DriverError::Connection(msg.clone()));
            }
            Ok(Box::new(MockDriver {
                device: device.clone(),
                script,
                calls: self.calls.clone(),
            }))
        }
    }

    /// Scripted device session
    pub struct MockDriver {
        device: DeviceHandle,
        script: DeviceScript,
        calls: Arc<Mutex<Vec<CallRecord>>>,
    }

    impl MockDriver {
        async fn call<T>(&self, op: MockOp, ok: T) -> Result<T, DriverError> {
            let started = Instant::now();
            if !self.script.delay.is_zero() {
                tokio::time::sleep(self.script.delay).await;
            }
            self.calls.lock().unwrap().push(CallRecord {
                device: self.device.name.clone(),
                op,
                started,
                finished: Instant::now(),
            });

            match &self.script.behavior {
                MockBehavior::FailOn(failing, msg) if *failing == op => {
                    Err(DriverError::Connection(msg.clone()))
                }
                MockBehavior::PanicOn(failing, msg) if *failing == op => {
                    panic!("{}", msg);
                }
                _ => Ok(ok),
            }
        }
    }

    #[async_trait]
    impl DeviceDriver for MockDriver {
        fn device(&self) -> &DeviceHandle {
            &self.device
        }

        async fn fetch_facts(&self) -> Result<Value, DriverError> {
            let facts = json!({
                "hostname": self.device.name,
                "model": "MockSwitch 9000",
                "os_version": "1.0.0",
                "uptime": 86400,
                "serial_number": format!("SN-{}", self.device.name),
                "vendor": "Mock"
            });
            self.call(MockOp::Facts, facts).await
        }

        async fn fetch_environment(&self) -> Result<Value, DriverError> {
            self.call(MockOp::Environment, self.script.environment.clone())
                .await
        }

        async fn fetch_interfaces(&self) -> Result<InterfaceData, DriverError> {
            let data = InterfaceData {
                interfaces: json!({
                    "GE0/0/1": {"is_up": true, "is_enabled": true},
                    "GE0/0/2": {"is_up": false, "is_enabled": true}
                }),
                counters: json!({
                    "GE0/0/1": {"rx_errors": 2, "tx_errors": 1},
                    "GE0/0/2": {"rx_errors": 0, "tx_errors": -1}
                }),
            };
            self.call(MockOp::Interfaces, data).await
        }

        async fn fetch_running_config(&self) -> Result<String, DriverError> {
            self.call(MockOp::RunningConfig, self.script.running_config.clone())
                .await
        }

        async fn run_command(&self, command: &str) -> Result<String, DriverError> {
            let output = self
                .script
                .command_outputs
                .get(command)
                .cloned()
                .unwrap_or_else(|| format!("output of {}", command));
            if output.starts_with("ERROR:") {
                self.call(MockOp::Command, ()).await?;
                return Err(DriverError::Command(output));
            }
            self.call(MockOp::Command, output).await
        }

        async fn apply_config(&self, commands: &[String]) -> Result<Value, DriverError> {
            let diff = json!({ "applied": commands.len(), "diff": commands.join("\n") });
            self.call(MockOp::ApplyConfig, diff).await
        }
    }
}
