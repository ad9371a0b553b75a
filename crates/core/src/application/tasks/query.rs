// Query: run each command in order, best effort

use super::{StepRecorder, TaskContext, TaskError, TaskFunction};
use crate::domain::StepValue;
use crate::port::DeviceDriver;
use async_trait::async_trait;
use tracing::warn;

pub struct QueryTask;

#[async_trait]
impl TaskFunction for QueryTask {
    fn name(&self) -> &'static str {
        "Run query commands"
    }

    async fn run(
        &self,
        driver: &dyn DeviceDriver,
        ctx: &TaskContext,
        _steps: &StepRecorder,
    ) -> Result<StepValue, TaskError> {
        let mut sections = Vec::with_capacity(ctx.commands.len());
        let mut failed = 0;

        // a failing command never stops the rest
        for cmd in &ctx.commands {
            match driver.run_command(cmd).await {
                Ok(output) => sections.push(format!("--- {} ---\n{}", cmd, output)),
                Err(e) => {
                    warn!(host = %driver.device().name, command = %cmd, error = %e, "Query command failed");
                    failed += 1;
                    sections.push(format!("--- {} ---\nERROR: {}", cmd, e));
                }
            }
        }

        let output = sections.join("\n");
        if failed > 0 {
            return Err(TaskError::CommandsFailed {
                failed,
                total: ctx.commands.len(),
                output,
            });
        }
        Ok(StepValue::Text(output))
    }
}
