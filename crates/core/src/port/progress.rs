// Progress Observer Port
// Step events from device workers, injected into the engine per run

use crate::domain::StepOutcome;
use async_trait::async_trait;

/// Receives step boundaries from concurrently running device workers.
///
/// Calls for one `(host, step)` pair are idempotent: the step name is the
/// natural key, repeated events update in place.
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn on_step_started(&self, host: &str, step: &str);

    async fn on_step_completed(&self, host: &str, step: &str, outcome: StepOutcome);
}

/// Observer that drops every event
pub struct NoopObserver;

#[async_trait]
impl ProgressObserver for NoopObserver {
    async fn on_step_started(&self, _host: &str, _step: &str) {}

    async fn on_step_completed(&self, _host: &str, _step: &str, _outcome: StepOutcome) {}
}
