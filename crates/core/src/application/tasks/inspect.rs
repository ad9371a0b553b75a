// Health inspection: facts, environment, interfaces -> HealthReport

use super::{StepRecorder, TaskContext, TaskError, TaskFunction};
use crate::domain::{DeviceHandle, StepValue};
use crate::port::DeviceDriver;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, warn};

const STEP_FACTS: &str = "Connect and gather facts";
const STEP_ENVIRONMENT: &str = "Gather CPU and memory metrics";
const STEP_INTERFACES: &str = "Gather interface status and counters";

const HUAWEI_MEMORY_COMMAND: &str = "display memory-usage";

const PERCENT_KEYS: [&str; 3] = ["usage_percentage", "usage", "utilization"];
const USED_KEYS: [&str; 4] = ["used", "used_ram", "used_mb", "usage_mb"];
const LIMIT_KEYS: [&str; 4] = ["limit", "total_ram", "total_mb", "size_mb"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: String,
    pub performance: Performance,
    pub audit_trail: AuditTrail,
    pub basic: BasicInfo,
    pub resources: Resources,
    pub hardware: Hardware,
    pub interface_stats: InterfaceStats,
}

/// Phase latencies in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub connect_latency: f64,
    pub env_gather_latency: f64,
    pub intf_gather_latency: f64,
    pub total_processing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub commands_executed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub hostname: String,
    pub model: String,
    pub version: String,
    pub uptime: f64,
    pub sn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu_avg: f64,
    pub memory_usage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    pub fans_ok: bool,
    pub pwr_ok: bool,
    pub temp_ok: bool,
    pub max_temp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub total: usize,
    pub up_count: usize,
    pub error_total: i64,
}

/// Deep health inspection
pub struct InspectTask;

#[async_trait]
impl TaskFunction for InspectTask {
    fn name(&self) -> &'static str {
        "Health inspection"
    }

    fn internal_steps(&self) -> &'static [&'static str] {
        &[STEP_FACTS, STEP_ENVIRONMENT, STEP_INTERFACES]
    }

    async fn run(
        &self,
        driver: &dyn DeviceDriver,
        ctx: &TaskContext,
        steps: &StepRecorder,
    ) -> Result<StepValue, TaskError> {
        let t0 = Instant::now();
        let facts = steps.step(STEP_FACTS, driver.fetch_facts()).await?;
        let t1 = Instant::now();
        let env = steps.step(STEP_ENVIRONMENT, driver.fetch_environment()).await?;
        let t2 = Instant::now();
        let intf = steps.step(STEP_INTERFACES, driver.fetch_interfaces()).await?;
        let t3 = Instant::now();

        let mut memory_usage = memory_usage(&env);
        if memory_usage == 0.0 && driver.device().is_huawei() {
            memory_usage = huawei_memory_fallback(driver).await.unwrap_or(0.0);
        }

        let now = chrono::DateTime::from_timestamp_millis(ctx.time_provider.now_millis())
            .unwrap_or_default()
            .with_timezone(&chrono::Local);

        let report = HealthReport {
            timestamp: now.to_rfc3339(),
            performance: Performance {
                connect_latency: (t1 - t0).as_secs_f64(),
                env_gather_latency: (t2 - t1).as_secs_f64(),
                intf_gather_latency: (t3 - t2).as_secs_f64(),
                total_processing: t0.elapsed().as_secs_f64(),
            },
            audit_trail: AuditTrail {
                commands_executed: vec![
                    "getter: facts".to_string(),
                    "getter: environment".to_string(),
                    "getter: interfaces/interfaces_counters".to_string(),
                ],
            },
            basic: basic_info(&facts),
            resources: Resources {
                cpu_avg: cpu_usage(&env),
                memory_usage,
            },
            hardware: Hardware {
                fans_ok: components_ok(&env["fans"]),
                pwr_ok: components_ok(&env["power"]),
                temp_ok: temperature_ok(&env["temperature"]),
                max_temp: max_temperature(&env["temperature"]),
            },
            interface_stats: interface_stats(&intf.interfaces, &intf.counters),
        };

        debug!(
            host = %steps.host(),
            cpu = report.resources.cpu_avg,
            memory = memory_usage,
            "Health report built"
        );
        Ok(StepValue::coerce(&report))
    }
}

fn text_field(facts: &Value, key: &str) -> String {
    match &facts[key] {
        Value::String(s) => s.clone(),
        Value::Null => "Unknown".to_string(),
        other => other.to_string(),
    }
}

fn basic_info(facts: &Value) -> BasicInfo {
    BasicInfo {
        hostname: text_field(facts, "hostname"),
        model: text_field(facts, "model"),
        version: text_field(facts, "os_version"),
        uptime: facts["uptime"].as_f64().unwrap_or(0.0),
        sn: text_field(facts, "serial_number"),
    }
}

/// First core reporting a usage figure
fn cpu_usage(env: &Value) -> f64 {
    env["cpu"]
        .as_object()
        .into_iter()
        .flat_map(|cores| cores.values())
        .find_map(|core| {
            core.get("%usage")
                .or_else(|| core.get("usage"))
                .and_then(Value::as_f64)
        })
        .unwrap_or(0.0)
}

/// First non-zero numeric value among `keys`
fn first_nonzero(metrics: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| metrics.get(*k).and_then(Value::as_f64))
        .find(|v| *v != 0.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Memory utilization over flat or nested metric maps.
///
/// Percentage keys win over used/limit pairs.
pub(crate) fn memory_usage(env: &Value) -> f64 {
    let Some(memory) = env["memory"].as_object() else {
        return 0.0;
    };

    let is_flat = PERCENT_KEYS
        .iter()
        .chain(USED_KEYS.iter())
        .chain(LIMIT_KEYS.iter())
        .any(|k| memory.contains_key(*k));
    let candidates: Vec<&Value> = if is_flat {
        vec![&env["memory"]]
    } else {
        memory.values().filter(|v| v.is_object()).collect()
    };

    for metrics in candidates {
        if let Some(pct) = first_nonzero(metrics, &PERCENT_KEYS) {
            return pct;
        }
        let used = first_nonzero(metrics, &USED_KEYS).unwrap_or(0.0);
        let limit = first_nonzero(metrics, &LIMIT_KEYS).unwrap_or(0.0);
        if limit > 0.0 {
            return round2(used / limit * 100.0);
        }
    }
    0.0
}

/// Scrape `display memory-usage` output
pub(crate) fn parse_huawei_memory(output: &str) -> Option<f64> {
    let percent = Regex::new(r"Memory Using Percentage Is:\s+(\d+)%").ok()?;
    if let Some(caps) = percent.captures(output) {
        return caps[1].parse().ok();
    }

    let total = Regex::new(r"(?i)System Total Memory Is:\s+(\d+)").ok()?;
    let used = Regex::new(r"(?i)Total Memory Used Is:\s+(\d+)").ok()?;
    let total: f64 = total.captures(output)?[1].parse().ok()?;
    let used: f64 = used.captures(output)?[1].parse().ok()?;
    (total > 0.0).then(|| round2(used / total * 100.0))
}

async fn huawei_memory_fallback(driver: &dyn DeviceDriver) -> Option<f64> {
    let device: &DeviceHandle = driver.device();
    match driver.run_command(HUAWEI_MEMORY_COMMAND).await {
        Ok(output) => parse_huawei_memory(&output),
        Err(e) => {
            warn!(host = %device.name, error = %e, "Huawei memory CLI fallback failed");
            None
        }
    }
}

/// Missing data counts as healthy
fn components_ok(components: &Value) -> bool {
    components.as_object().map_or(true, |items| {
        items
            .values()
            .all(|item| item.get("status").and_then(Value::as_bool).unwrap_or(true))
    })
}

fn temperature_ok(sensors: &Value) -> bool {
    sensors.as_object().map_or(true, |items| {
        !items.values().any(|item| {
            item.get("is_alert").and_then(Value::as_bool).unwrap_or(false)
                || item.get("is_critical").and_then(Value::as_bool).unwrap_or(false)
        })
    })
}

fn max_temperature(sensors: &Value) -> Option<f64> {
    sensors
        .as_object()?
        .values()
        .filter_map(|item| item.get("temperature").and_then(Value::as_f64))
        .reduce(f64::max)
}

fn interface_stats(interfaces: &Value, counters: &Value) -> InterfaceStats {
    let interfaces = interfaces.as_object();
    let errors = |c: &Value, key: &str| c.get(key).and_then(Value::as_i64).unwrap_or(0).max(0);

    InterfaceStats {
        total: interfaces.map_or(0, |i| i.len()),
        up_count: interfaces.map_or(0, |i| {
            i.values()
                .filter(|v| v.get("is_up").and_then(Value::as_bool).unwrap_or(false))
                .count()
        }),
        error_total: counters.as_object().map_or(0, |c| {
            c.values()
                .map(|v| errors(v, "rx_errors") + errors(v, "tx_errors"))
                .sum()
        }),
    }
}
