// Progress Reporter: folds step events into the persisted run

use crate::domain::{HostResult, RunId, StepOutcome};
use crate::error::Result;
use crate::port::{ProgressObserver, RunRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes every step event straight through to the run store.
///
/// Each event is one self-contained cycle: load that host's latest record,
/// merge the event, store it back. Other hosts are never read. Events of
/// one host arrive in order from its single worker; hosts interleave freely.
pub struct StoreProgressReporter {
    run_id: RunId,
    runs: Arc<dyn RunRepository>,
}

impl StoreProgressReporter {
    pub fn new(run_id: RunId, runs: Arc<dyn RunRepository>) -> Self {
        Self { run_id, runs }
    }

    async fn merge<F>(&self, host: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut HostResult) + Send,
    {
        let mut host_result = self
            .runs
            .find_host_result(&self.run_id, host)
            .await?
            .unwrap_or_default();
        apply(&mut host_result);
        self.runs
            .upsert_host_result(&self.run_id, host, &host_result)
            .await
    }
}

#[async_trait]
impl ProgressObserver for StoreProgressReporter {
    async fn on_step_started(&self, host: &str, step: &str) {
        debug!(run_id = %self.run_id, host = %host, step = %step, "Step started");
        if let Err(e) = self.merge(host, |h| h.mark_step_started(step)).await {
            warn!(run_id = %self.run_id, host = %host, step = %step, error = %e, "Failed to record step start");
        }
    }

    async fn on_step_completed(&self, host: &str, step: &str, outcome: StepOutcome) {
        debug!(
            run_id = %self.run_id,
            host = %host,
            step = %step,
            success = outcome.succeeded,
            "Step completed"
        );
        if let Err(e) = self
            .merge(host, |h| h.record_step_completed(step, outcome))
            .await
        {
            warn!(run_id = %self.run_id, host = %host, step = %step, error = %e, "Failed to record step completion");
        }
    }
}
