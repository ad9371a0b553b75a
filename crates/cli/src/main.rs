//! NetOps CLI - Command-line interface for the NetOps automation daemon

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9531";

#[derive(Parser)]
#[command(name = "netops")]
#[command(about = "NetOps automation CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "NETOPS_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Print raw JSON results instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage jobs
    #[command(subcommand)]
    Job(JobCommand),

    /// Inspect run history
    #[command(subcommand)]
    Run(RunCommand),

    /// Run a task on devices right away
    Quick {
        /// Task type (query, backup, config, inspect)
        task_type: String,

        /// Target device name (repeatable)
        #[arg(short, long = "device", required = true)]
        devices: Vec<String>,

        /// Command line for query/config tasks (repeatable)
        #[arg(short, long = "command")]
        commands: Vec<String>,
    },

    /// Latest inspection snapshot of every inventory device
    Fleet,

    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum JobCommand {
    /// Create a job
    Create {
        #[arg(short, long)]
        name: String,

        /// Task type (query, backup, config, inspect)
        #[arg(short, long)]
        task_type: String,

        /// Target device name (repeatable, empty = all devices)
        #[arg(short, long = "device")]
        devices: Vec<String>,

        /// Command line for query/config tasks (repeatable)
        #[arg(short, long = "command")]
        commands: Vec<String>,

        /// immediate, cron or once
        #[arg(long, default_value = "immediate")]
        schedule: String,

        /// Cron expression or RFC 3339 instant
        #[arg(long)]
        at: Option<String>,

        /// Create without arming the schedule
        #[arg(long)]
        inactive: bool,
    },

    /// List jobs
    List,

    /// Show one job
    Get { job_id: String },

    /// Change a job; omitted fields stay as they are
    Update {
        job_id: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Replace target devices (repeatable)
        #[arg(short, long = "device")]
        devices: Option<Vec<String>>,

        /// Replace commands (repeatable)
        #[arg(short, long = "command")]
        commands: Option<Vec<String>>,

        #[arg(long)]
        schedule: Option<String>,

        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        active: Option<bool>,
    },

    /// Delete a job (run history is kept)
    Delete { job_id: String },

    /// Trigger a job now
    Run { job_id: String },
}

#[derive(Subcommand)]
enum RunCommand {
    /// List runs, newest first
    List {
        /// Only runs of this job
        #[arg(long)]
        job: Option<String>,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show per-device results of a run
    Get { run_id: String },

    /// Delete a finished run
    Delete { run_id: String },

    /// Inspection summary of a run
    Summary { run_id: String },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Tabled)]
struct JobRow {
    id: String,
    name: String,
    task: String,
    schedule: String,
    active: String,
    devices: String,
}

#[derive(Tabled)]
struct RunRow {
    id: String,
    job: String,
    status: String,
    trigger: String,
    devices: String,
    started: String,
    duration: String,
}

#[derive(Tabled)]
struct HostRow {
    host: String,
    status: String,
    steps: String,
    error: String,
}

#[derive(Tabled)]
struct DeviceRow {
    hostname: String,
    status: String,
    cpu: String,
    mem: String,
    model: String,
    version: String,
}

#[derive(Tabled)]
struct FleetRow {
    hostname: String,
    ip: String,
    status: String,
    cpu: String,
    mem: String,
    temp: String,
    hardware: String,
    inspected: String,
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_ms(value: &Value) -> String {
    value
        .as_i64()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn colored_status(status: &str) -> String {
    match status {
        "success" => status.green().to_string(),
        "partial" => status.yellow().to_string(),
        "failed" | "cancelled" => status.red().to_string(),
        "running" | "pending" => status.cyan().to_string(),
        other => other.to_string(),
    }
}

fn create_params(
    name: String,
    task_type: String,
    devices: Vec<String>,
    commands: Vec<String>,
    schedule: String,
    at: Option<String>,
    inactive: bool,
) -> Value {
    json!({
        "name": name,
        "task_type": task_type,
        "target_devices": devices,
        "commands": commands,
        "schedule_type": schedule,
        "schedule_value": at,
        "is_active": !inactive,
    })
}

/// Only the fields the operator passed end up in the patch
fn update_params(
    job_id: String,
    name: Option<String>,
    devices: Option<Vec<String>>,
    commands: Option<Vec<String>>,
    schedule: Option<String>,
    at: Option<String>,
    active: Option<bool>,
) -> Value {
    let mut params = Map::new();
    params.insert("job_id".into(), json!(job_id));
    let mut set = |key: &str, value: Option<Value>| {
        if let Some(v) = value {
            params.insert(key.into(), v);
        }
    };
    set("name", name.map(Value::from));
    set("target_devices", devices.map(|d| json!(d)));
    set("commands", commands.map(|c| json!(c)));
    set("schedule_type", schedule.map(Value::from));
    set("schedule_value", at.map(Value::from));
    set("is_active", active.map(Value::from));
    Value::Object(params)
}

fn job_row(job: &Value) -> JobRow {
    let schedule = match job["schedule_value"].as_str() {
        Some(v) => format!("{} {}", text(&job["schedule_type"]), v),
        None => text(&job["schedule_type"]),
    };
    let devices = job["target_devices"]
        .as_array()
        .filter(|d| !d.is_empty())
        .map(|d| d.iter().map(text).collect::<Vec<_>>().join(","))
        .unwrap_or_else(|| "(all)".to_string());
    JobRow {
        id: text(&job["id"]),
        name: text(&job["name"]),
        task: text(&job["task_type"]),
        schedule,
        active: text(&job["is_active"]),
        devices,
    }
}

fn run_row(run: &Value) -> RunRow {
    RunRow {
        id: text(&run["id"]),
        job: text(&run["job_id"]),
        status: colored_status(run["status"].as_str().unwrap_or("-")),
        trigger: text(&run["trigger_type"]),
        devices: format!(
            "{}/{} ok",
            text(&run["success_count"]),
            text(&run["total_devices"])
        ),
        started: format_ms(&run["start_time"]),
        duration: run["duration"]
            .as_f64()
            .map(|d| format!("{:.2}s", d))
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn fleet_rows(fleet: &Value) -> Vec<FleetRow> {
    let Some(devices) = fleet["device_list"].as_array() else {
        return Vec::new();
    };
    devices
        .iter()
        .map(|d| {
            let status = d["status"].as_str().unwrap_or("-");
            let status = if d["has_error"].as_bool().unwrap_or(false) {
                status.red().bold().to_string()
            } else {
                colored_status(status)
            };
            let hardware = match (
                d["fans_ok"].as_bool().unwrap_or(true),
                d["pwr_ok"].as_bool().unwrap_or(true),
            ) {
                (true, true) => "ok".to_string(),
                (false, true) => "fan fault".to_string(),
                (true, false) => "power fault".to_string(),
                (false, false) => "fan+power fault".to_string(),
            };
            FleetRow {
                hostname: text(&d["hostname"]),
                ip: text(&d["ip"]),
                status,
                cpu: format!("{:.1}%", d["cpu"].as_f64().unwrap_or(0.0)),
                mem: format!("{:.1}%", d["mem"].as_f64().unwrap_or(0.0)),
                temp: format!("{:.0}", d["temperature"].as_f64().unwrap_or(0.0)),
                hardware,
                inspected: format_ms(&d["last_inspected"]),
            }
        })
        .collect()
}

fn host_rows(run: &Value) -> Vec<HostRow> {
    let Some(results) = run["results"].as_object() else {
        return Vec::new();
    };
    results
        .iter()
        .filter(|(key, _)| key.as_str() != "system_error")
        .map(|(host, result)| {
            let steps = result["steps"]
                .as_array()
                .map(|steps| {
                    steps
                        .iter()
                        .map(|s| format!("{}:{}", text(&s["name"]), text(&s["status"])))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            HostRow {
                host: host.clone(),
                status: colored_status(result["status"].as_str().unwrap_or("-")),
                steps,
                error: text(&result["error"]),
            }
        })
        .collect()
}

fn print_value(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_distribution(label: &str, dist: &Value) {
    let Some(dist) = dist.as_object() else {
        return;
    };
    let buckets = dist
        .iter()
        .map(|(bucket, count)| format!("{} {}", bucket, count))
        .collect::<Vec<_>>()
        .join(" | ");
    println!("  {} {}", label.bold(), buckets);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let url = cli.rpc_url.as_str();

    match cli.command {
        Commands::Job(JobCommand::Create {
            name,
            task_type,
            devices,
            commands,
            schedule,
            at,
            inactive,
        }) => {
            let params = create_params(name, task_type, devices, commands, schedule, at, inactive);
            let result = call_rpc(url, "automation.job.create.v1", params).await?;
            if cli.json {
                return print_value(&result);
            }

            println!("{}", "✓ Job created".green().bold());
            println!("  {} {}", "Job ID:".bold(), text(&result["job_id"]));
            if let Some(run_id) = result["run_id"].as_str() {
                println!("  {} {}", "Run ID:".bold(), run_id);
            }
        }

        Commands::Job(JobCommand::List) => {
            let result = call_rpc(url, "automation.job.list.v1", json!({})).await?;
            if cli.json {
                return print_value(&result);
            }

            let rows: Vec<JobRow> = result
                .as_array()
                .map(|jobs| jobs.iter().map(job_row).collect())
                .unwrap_or_default();
            if rows.is_empty() {
                println!("{}", "No jobs".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::Job(JobCommand::Get { job_id }) => {
            let result =
                call_rpc(url, "automation.job.get.v1", json!({ "job_id": job_id })).await?;
            print_value(&result)?;
        }

        Commands::Job(JobCommand::Update {
            job_id,
            name,
            devices,
            commands,
            schedule,
            at,
            active,
        }) => {
            let params = update_params(job_id, name, devices, commands, schedule, at, active);
            let result = call_rpc(url, "automation.job.update.v1", params).await?;
            if cli.json {
                return print_value(&result);
            }

            println!("{}", "✓ Job updated".green().bold());
            println!("{}", Table::new(vec![job_row(&result)]));
        }

        Commands::Job(JobCommand::Delete { job_id }) => {
            call_rpc(url, "automation.job.delete.v1", json!({ "job_id": job_id })).await?;
            println!("{}", format!("✓ Job {} deleted", job_id).green().bold());
        }

        Commands::Job(JobCommand::Run { job_id }) => {
            let result =
                call_rpc(url, "automation.job.run.v1", json!({ "job_id": job_id })).await?;
            if cli.json {
                return print_value(&result);
            }

            println!(
                "{}",
                format!("✓ Run {} started", text(&result["run_id"]))
                    .green()
                    .bold()
            );
        }

        Commands::Quick {
            task_type,
            devices,
            commands,
        } => {
            let params = json!({
                "task_type": task_type,
                "device_names": devices,
                "commands": commands,
            });
            let result = call_rpc(url, "automation.quick_task.v1", params).await?;
            if cli.json {
                return print_value(&result);
            }

            println!("{}", "✓ Quick task started".green().bold());
            println!("  {} {}", "Job:".bold(), text(&result["job_name"]));
            println!("  {} {}", "Run ID:".bold(), text(&result["run_id"]));
        }

        Commands::Run(RunCommand::List { job, limit }) => {
            let params = json!({ "job_id": job, "limit": limit });
            let result = call_rpc(url, "automation.run.list.v1", params).await?;
            if cli.json {
                return print_value(&result);
            }

            let rows: Vec<RunRow> = result
                .as_array()
                .map(|runs| runs.iter().map(run_row).collect())
                .unwrap_or_default();
            if rows.is_empty() {
                println!("{}", "No runs".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::Run(RunCommand::Get { run_id }) => {
            let result =
                call_rpc(url, "automation.run.get.v1", json!({ "run_id": run_id })).await?;
            if cli.json {
                return print_value(&result);
            }

            println!("{}", Table::new(vec![run_row(&result)]));
            if let Some(err) = result["results"]["system_error"].as_str() {
                println!("  {} {}", "System error:".red().bold(), err);
            }
            let hosts = host_rows(&result);
            if !hosts.is_empty() {
                println!();
                println!("{}", Table::new(hosts));
            }
        }

        Commands::Run(RunCommand::Delete { run_id }) => {
            call_rpc(url, "automation.run.delete.v1", json!({ "run_id": run_id })).await?;
            println!("{}", format!("✓ Run {} deleted", run_id).green().bold());
        }

        Commands::Run(RunCommand::Summary { run_id }) => {
            let summary =
                call_rpc(url, "automation.run.summary.v1", json!({ "run_id": run_id })).await?;
            if cli.json {
                return print_value(&summary);
            }

            println!("{}", format!("Inspection summary {}", run_id).cyan().bold());
            println!();
            println!(
                "  {} {}  {} {}  {} {}",
                "Total:".bold(),
                summary["total"],
                "Success:".bold(),
                summary["success"].to_string().green(),
                "Failed:".bold(),
                summary["failed"].to_string().red()
            );
            print_distribution("CPU:", &summary["cpu_distribution"]);
            print_distribution("Memory:", &summary["mem_distribution"]);

            let hw = &summary["hardware_health"];
            for (label, key) in [("Fans:", "fans"), ("Power:", "pwr"), ("Temp:", "temp")] {
                println!(
                    "  {} {} ok / {} fail",
                    label.bold(),
                    hw[key]["ok"],
                    hw[key]["fail"]
                );
            }
            println!(
                "  {} {}",
                "Interface errors:".bold(),
                summary["interface_errors"]["total_errors"]
            );

            let devices: Vec<DeviceRow> = summary["device_list"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .map(|d| DeviceRow {
                            hostname: text(&d["hostname"]),
                            status: colored_status(d["status"].as_str().unwrap_or("-")),
                            cpu: format!("{:.1}%", d["cpu"].as_f64().unwrap_or(0.0)),
                            mem: format!("{:.1}%", d["mem"].as_f64().unwrap_or(0.0)),
                            model: text(&d["model"]),
                            version: text(&d["version"]),
                        })
                        .collect()
                })
                .unwrap_or_default();
            if !devices.is_empty() {
                println!();
                println!("{}", Table::new(devices));
            }
        }

        Commands::Fleet => {
            let fleet = call_rpc(url, "automation.inventory.summary.v1", json!({})).await?;
            if cli.json {
                return print_value(&fleet);
            }

            let stats = &fleet["stats"];
            println!("{}", "Fleet inspection snapshot".cyan().bold());
            println!();
            println!(
                "  {} {}  {} {}  {} {}  {} {}",
                "Devices:".bold(),
                stats["total"],
                "Normal:".bold(),
                stats["normal"].to_string().green(),
                "Critical:".bold(),
                stats["critical"].to_string().red(),
                "Uninspected:".bold(),
                stats["pending"].to_string().yellow()
            );
            print_distribution("CPU:", &fleet["cpu_distribution"]);
            print_distribution("Memory:", &fleet["mem_distribution"]);

            let rows = fleet_rows(&fleet);
            if !rows.is_empty() {
                println!();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(url, "system.health.v1", json!({})).await {
                Ok(health) => {
                    println!("  {} {}", "RPC URL:".bold(), url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), text(&health["version"]));
                    println!("  {} {} seconds", "Uptime:".bold(), health["uptime_seconds"]);
                    println!("  {} {}", "Runs in flight:".bold(), health["in_flight_runs"]);
                    let armed = health["armed_triggers"]
                        .as_array()
                        .map(|a| a.len())
                        .unwrap_or(0);
                    println!("  {} {}", "Armed triggers:".bold(), armed);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
