//! Inspection summaries for dashboards
//!
//! `summarize` aggregates the HealthReports of one run. `summarize_fleet`
//! builds the latest-known snapshot of every inventory device from recent
//! runs.

use crate::application::constants::SUMMARY_TOP_ERROR_DEVICES;
use crate::domain::{DeviceHandle, HostResult, JobRun, RunId, RunStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const BUCKETS: [&str; 5] = ["0-20%", "20-40%", "40-60%", "60-80%", "80-100%"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkFail {
    pub ok: u32,
    pub fail: u32,
}

impl OkFail {
    fn record(&mut self, healthy: bool) {
        if healthy {
            self.ok += 1;
        } else {
            self.fail += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareHealth {
    pub fans: OkFail,
    pub pwr: OkFail,
    pub temp: OkFail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDevice {
    pub hostname: String,
    pub errors: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceErrors {
    pub total_errors: i64,
    pub top_error_devices: Vec<ErrorDevice>,
}

/// One row of the per-device table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub hostname: String,
    pub status: String,
    pub cpu: f64,
    pub mem: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub error_msg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub cpu_distribution: BTreeMap<String, u32>,
    pub mem_distribution: BTreeMap<String, u32>,
    pub hardware_health: HardwareHealth,
    pub interface_errors: InterfaceErrors,
    pub device_list: Vec<DeviceSummary>,
}

/// Distribution bucket for a percentage
pub fn bucket(value: f64) -> &'static str {
    match value {
        v if v < 20.0 => BUCKETS[0],
        v if v < 40.0 => BUCKETS[1],
        v if v < 60.0 => BUCKETS[2],
        v if v < 80.0 => BUCKETS[3],
        _ => BUCKETS[4],
    }
}

fn empty_distribution() -> BTreeMap<String, u32> {
    BUCKETS.iter().map(|b| (b.to_string(), 0)).collect()
}

/// Latest structured step result that looks like a HealthReport
fn find_health_report(host: &HostResult) -> Option<&Value> {
    host.steps.iter().rev().find_map(|step| {
        let value = step.result.as_ref()?.as_structured()?;
        let map = value.as_object()?;
        (map.contains_key("resources") || map.contains_key("basic")).then_some(value)
    })
}

fn number(value: &Value, section: &str, key: &str) -> f64 {
    value
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

// absent hardware data counts as healthy
fn flag(value: &Value, key: &str) -> bool {
    value
        .get("hardware")
        .and_then(|h| h.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get("basic")
        .and_then(|b| b.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Aggregate a run's per-host results.
///
/// Hosts without a HealthReport still count toward success/failed and
/// appear in the device list with zeroed metrics.
pub fn summarize(run: &JobRun) -> RunSummary {
    let mut summary = RunSummary {
        run_id: run.id.clone(),
        total: run.results.hosts.len() as u32,
        success: 0,
        failed: 0,
        cpu_distribution: empty_distribution(),
        mem_distribution: empty_distribution(),
        hardware_health: HardwareHealth::default(),
        interface_errors: InterfaceErrors::default(),
        device_list: Vec::with_capacity(run.results.hosts.len()),
    };
    let mut error_devices = Vec::new();

    for (name, host) in &run.results.hosts {
        if host.success {
            summary.success += 1;
        } else {
            summary.failed += 1;
        }

        let mut entry = DeviceSummary {
            hostname: name.clone(),
            status: if host.success { "success" } else { "failed" }.to_string(),
            cpu: 0.0,
            mem: 0.0,
            model: None,
            version: None,
            error_msg: host.error.clone(),
        };

        if let Some(report) = find_health_report(host) {
            entry.cpu = number(report, "resources", "cpu_avg");
            entry.mem = number(report, "resources", "memory_usage");
            entry.model = text(report, "model");
            entry.version = text(report, "version");

            *summary
                .cpu_distribution
                .entry(bucket(entry.cpu).to_string())
                .or_default() += 1;
            *summary
                .mem_distribution
                .entry(bucket(entry.mem).to_string())
                .or_default() += 1;

            summary.hardware_health.fans.record(flag(report, "fans_ok"));
            summary.hardware_health.pwr.record(flag(report, "pwr_ok"));
            summary.hardware_health.temp.record(flag(report, "temp_ok"));

            let errors = report
                .get("interface_stats")
                .and_then(|s| s.get("error_total"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            summary.interface_errors.total_errors += errors;
            if errors > 0 {
                error_devices.push(ErrorDevice {
                    hostname: name.clone(),
                    errors,
                });
            }
        }

        summary.device_list.push(entry);
    }

    // stable: ties keep host-name order
    error_devices.sort_by(|a, b| b.errors.cmp(&a.errors));
    error_devices.truncate(SUMMARY_TOP_ERROR_DEVICES);
    summary.interface_errors.top_error_devices = error_devices;
    summary
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStats {
    pub total: u32,
    pub normal: u32,
    pub critical: u32,
    /// Devices with no HealthReport in the scanned runs
    pub pending: u32,
}

/// One device of the fleet snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetDevice {
    pub hostname: String,
    pub ip: String,
    pub vendor: String,
    pub model: Option<String>,
    /// Start of the run the snapshot comes from (epoch ms)
    pub last_inspected: Option<i64>,
    pub run_id: Option<RunId>,
    /// `uninspected`, `success` or `failed`
    pub status: String,
    pub cpu: f64,
    pub mem: f64,
    pub temperature: f64,
    pub fans_ok: bool,
    pub pwr_ok: bool,
    pub has_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub stats: FleetStats,
    pub cpu_distribution: BTreeMap<String, u32>,
    pub mem_distribution: BTreeMap<String, u32>,
    /// Devices with errors first, then by name
    pub device_list: Vec<FleetDevice>,
}

/// Newest HealthReport of one device within one run
struct Snapshot<'a> {
    run: &'a JobRun,
    success: bool,
    report: &'a Value,
}

// only full reports (with resources) count for the fleet view
fn find_resource_report(host: &HostResult) -> Option<&Value> {
    host.steps.iter().rev().find_map(|step| {
        let value = step.result.as_ref()?.as_structured()?;
        value.get("resources").is_some().then_some(value)
    })
}

/// Latest inspection snapshot of every device in `devices`.
///
/// `recent_runs` must be ordered newest first. Only Success and Partial
/// runs are considered; the first run carrying a HealthReport for a device
/// wins.
pub fn summarize_fleet(devices: &[DeviceHandle], recent_runs: &[JobRun]) -> FleetSummary {
    let mut latest: HashMap<&str, Snapshot<'_>> = HashMap::with_capacity(devices.len());
    let wanted: HashSet<&str> = devices.iter().map(|d| d.name.as_str()).collect();

    for run in recent_runs
        .iter()
        .filter(|r| matches!(r.status, RunStatus::Success | RunStatus::Partial))
    {
        if latest.len() == wanted.len() {
            break;
        }
        for (name, host) in &run.results.hosts {
            if !wanted.contains(name.as_str()) || latest.contains_key(name.as_str()) {
                continue;
            }
            if let Some(report) = find_resource_report(host) {
                latest.insert(
                    name.as_str(),
                    Snapshot {
                        run,
                        success: host.success,
                        report,
                    },
                );
            }
        }
    }

    let mut summary = FleetSummary {
        stats: FleetStats {
            total: devices.len() as u32,
            pending: (devices.len() - latest.len()) as u32,
            ..FleetStats::default()
        },
        cpu_distribution: empty_distribution(),
        mem_distribution: empty_distribution(),
        device_list: Vec::with_capacity(devices.len()),
    };

    for device in devices {
        let mut entry = FleetDevice {
            hostname: device.name.clone(),
            ip: device.hostname.clone(),
            vendor: device.platform.clone(),
            model: device
                .metadata
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
            last_inspected: None,
            run_id: None,
            status: "uninspected".to_string(),
            cpu: 0.0,
            mem: 0.0,
            temperature: 0.0,
            fans_ok: true,
            pwr_ok: true,
            has_error: false,
        };

        if let Some(snap) = latest.get(device.name.as_str()) {
            let report = snap.report;
            entry.last_inspected = Some(snap.run.start_time);
            entry.run_id = Some(snap.run.id.clone());
            entry.status = if snap.success { "success" } else { "failed" }.to_string();
            entry.cpu = number(report, "resources", "cpu_avg");
            entry.mem = number(report, "resources", "memory_usage");
            entry.temperature = number(report, "hardware", "max_temp");
            entry.fans_ok = flag(report, "fans_ok");
            entry.pwr_ok = flag(report, "pwr_ok");
            entry.has_error = !(snap.success && entry.fans_ok && entry.pwr_ok);
            if entry.model.is_none() {
                entry.model = text(report, "model");
            }

            if entry.has_error {
                summary.stats.critical += 1;
            } else {
                summary.stats.normal += 1;
            }
            *summary
                .cpu_distribution
                .entry(bucket(entry.cpu).to_string())
                .or_default() += 1;
            *summary
                .mem_distribution
                .entry(bucket(entry.mem).to_string())
                .or_default() += 1;
        }

        summary.device_list.push(entry);
    }

    summary
        .device_list
        .sort_by(|a, b| b.has_error.cmp(&a.has_error).then_with(|| a.hostname.cmp(&b.hostname)));
    summary
}
