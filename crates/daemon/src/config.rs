//! Daemon configuration
//!
//! Environment-driven, loaded once at startup. Path values are
//! tilde/env expanded with `shellexpand`.

use anyhow::{Context, Result};
use netops_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use netops_core::application::constants::DEFAULT_MAX_WORKERS;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "~/.netops/automation.db";
pub const DEFAULT_BACKUP_DIR: &str = "~/.netops/backups";
pub const DEFAULT_NAPALM_BIN: &str = "napalm";
pub const DEFAULT_DRIVER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub max_workers: usize,
    pub backup_dir: PathBuf,
    pub napalm_bin: PathBuf,
    pub driver_timeout: Duration,
    pub strict_targets: bool,
    pub log_format: LogFormat,
    /// Daily-rolling log files go here when set
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = expand(&var("NETOPS_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into()))?;
        let backup_dir =
            expand(&var("NETOPS_BACKUP_DIR").unwrap_or_else(|| DEFAULT_BACKUP_DIR.into()))?;
        let napalm_bin =
            expand(&var("NETOPS_NAPALM_BIN").unwrap_or_else(|| DEFAULT_NAPALM_BIN.into()))?;
        let log_dir = var("NETOPS_LOG_DIR").map(|d| expand(&d)).transpose()?;

        let rpc_port = match var("NETOPS_RPC_PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("NETOPS_RPC_PORT is not a port: {}", v))?,
            None => DEFAULT_RPC_PORT,
        };

        let max_workers = match var("NETOPS_MAX_WORKERS") {
            Some(v) => {
                let n = v
                    .parse::<usize>()
                    .with_context(|| format!("NETOPS_MAX_WORKERS is not a number: {}", v))?;
                anyhow::ensure!(n > 0, "NETOPS_MAX_WORKERS must be at least 1");
                n
            }
            None => DEFAULT_MAX_WORKERS,
        };

        let timeout_secs = match var("NETOPS_DRIVER_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("NETOPS_DRIVER_TIMEOUT_SECS is not a number: {}", v))?,
            None => DEFAULT_DRIVER_TIMEOUT_SECS,
        };

        let strict_targets = match var("NETOPS_STRICT_TARGETS") {
            Some(v) => parse_bool(&v)
                .with_context(|| format!("NETOPS_STRICT_TARGETS is not a boolean: {}", v))?,
            None => false,
        };

        let log_format = match var("NETOPS_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            db_path,
            rpc_host: var("NETOPS_RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.into()),
            rpc_port,
            max_workers,
            backup_dir,
            napalm_bin,
            driver_timeout: Duration::from_secs(timeout_secs),
            strict_targets,
            log_format,
            log_dir,
        })
    }

    /// sqlx connection URL of the database file
    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path.display())
    }
}

fn expand(value: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(value)
        .with_context(|| format!("Cannot expand path: {}", value))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognized value '{}'", other),
    }
}
