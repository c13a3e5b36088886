//! Background driver for C13. One job run claims whatever is eligible for
//! retry, pushes each through the retry/recompute state machine, then
//! sweeps anything stuck in `PENDING_RECOMPUTE` past the recovery
//! threshold. Scheduled repeatedly rather than run once per incident, so a
//! crash mid-batch only loses the in-flight claim, not the queue.

use loco_rs::prelude::*;
use loco_rs::worker::Worker;
use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::services::retry_orchestrator::RetryOrchestrator;

const BATCH_LIMIT: u64 = 50;

#[derive(Deserialize, Debug, Serialize)]
pub struct RetryOrchestratorWorkerArgs {
    pub tenant_id: String,
}

pub struct RetryOrchestratorWorker {
    pub ctx: AppContext,
}

impl RetryOrchestratorWorker {
    pub fn build(ctx: &AppContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Worker<RetryOrchestratorWorkerArgs> for RetryOrchestratorWorker {
    async fn perform(&self, args: RetryOrchestratorWorkerArgs) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        let thresholds = Thresholds::default();
        let orchestrator = RetryOrchestrator::new(&self.ctx.db, &thresholds);
        let now = chrono::Utc::now();

        let summary = orchestrator.run_batch(&args.tenant_id, now, BATCH_LIMIT).await?;
        tracing::info!(
            tenant_id = %args.tenant_id,
            claimed = summary.claimed,
            resolved = summary.resolved,
            exhausted = summary.exhausted,
            errors = summary.errors,
            "retry orchestrator batch complete"
        );

        let recovered = orchestrator.process_pending_recomputes(&args.tenant_id, now, BATCH_LIMIT).await?;
        if recovered > 0 {
            tracing::warn!(tenant_id = %args.tenant_id, recovered, "swept stuck PENDING_RECOMPUTE incidents");
        }

        Ok(())
    }
}
