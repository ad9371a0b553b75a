// Config push: whole command set in one driver call

use super::{StepRecorder, TaskContext, TaskError, TaskFunction};
use crate::domain::StepValue;
use crate::port::DeviceDriver;
use async_trait::async_trait;

pub struct ApplyConfigTask;

#[async_trait]
impl TaskFunction for ApplyConfigTask {
    fn name(&self) -> &'static str {
        "Apply configuration"
    }

    async fn run(
        &self,
        driver: &dyn DeviceDriver,
        ctx: &TaskContext,
        _steps: &StepRecorder,
    ) -> Result<StepValue, TaskError> {
        let result = driver.apply_config(&ctx.commands).await?;
        Ok(StepValue::coerce(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context, RecordingObserver};
    use super::*;
    use crate::domain::DeviceHandle;
    use crate::port::device_driver::mocks::{MockDriverFactory, MockOp};
    use crate::port::DriverFactory;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pushes_all_commands_in_one_call() {
        let factory = MockDriverFactory::new();
        let driver = factory
            .create(&DeviceHandle::new("sw1", "10.0.0.1", "ios"))
            .unwrap();
        let rec = StepRecorder::new("sw1", Arc::new(RecordingObserver::default()));
        let ctx = context(&["interface GE0/0/1", "description uplink"], std::env::temp_dir());

        let value = ApplyConfigTask.run(driver.as_ref(), &ctx, &rec).await.unwrap();
        assert_eq!(value.as_structured().unwrap()["applied"], 2);

        let calls = factory.calls_for("sw1");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, MockOp::ApplyConfig);
    }
}
