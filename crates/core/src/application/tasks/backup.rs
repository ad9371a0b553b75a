// Backup: running configuration -> <backup_dir>/<region>/<device>/<device>_<ts>.cfg

use super::{StepRecorder, TaskContext, TaskError, TaskFunction};
use crate::domain::StepValue;
use crate::port::DeviceDriver;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

pub struct BackupTask;

/// One directory or file-name component: separators become `_`, and a
/// component made only of dots (or nothing) cannot walk out of the tree.
fn path_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        cleaned.replace('.', "_") + "_"
    } else {
        cleaned
    }
}

impl BackupTask {
    /// Target file of one backup, always inside `ctx.backup_dir`
    pub fn target_path(ctx: &TaskContext, region: &str, device: &str) -> PathBuf {
        let region = path_component(region);
        let device = path_component(device);
        let stamp = chrono::DateTime::from_timestamp_millis(ctx.time_provider.now_millis())
            .unwrap_or_default()
            .with_timezone(&chrono::Local)
            .format("%Y%m%d_%H%M%S");
        ctx.backup_dir
            .join(region)
            .join(&device)
            .join(format!("{}_{}.cfg", device, stamp))
    }
}

#[async_trait]
impl TaskFunction for BackupTask {
    fn name(&self) -> &'static str {
        "Backup running configuration"
    }

    async fn run(
        &self,
        driver: &dyn DeviceDriver,
        ctx: &TaskContext,
        _steps: &StepRecorder,
    ) -> Result<StepValue, TaskError> {
        let device = driver.device();
        let config = driver.fetch_running_config().await?;

        let path = Self::target_path(ctx, device.region_or_default(), &device.name);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, config.as_bytes()).await?;

        let saved = path.to_string_lossy().into_owned();
        info!(host = %device.name, path = %saved, bytes = config.len(), "Configuration backed up");
        Ok(StepValue::Text(saved))
    }
}
