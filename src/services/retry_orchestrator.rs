//! C13 — couples C11 (retry) and C12 (recompute) behind one entry point.
//! `process_incident`/`run_batch` are the only places that call both;
//! RESOLVED still only ever comes out of [`RecomputeService`].
//!
//! Status flow:
//! `PENDING_RETRY` -(fail)-> `PENDING_RETRY` (backoff) or `OPEN` (exhaust)
//! `PENDING_RETRY` -(success)-> `PENDING_RECOMPUTE`
//! `PENDING_RECOMPUTE` -(resolved)-> `RESOLVED`
//! `PENDING_RECOMPUTE` -(not resolved)-> unchanged (retry executor decides next)
//! `PENDING_RECOMPUTE` -(reclassify)-> primary/category update, status unchanged

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Thresholds;
use crate::guards::kill_switch;
use crate::models::_entities::incidents;
use crate::models::incident::{Incident, ResolutionReason};
use crate::services::quality_scorer::{
    CalculationErrorInput, CalculationInput, DebugMetaInput, ExtractionInput, Scorer, ValidationInput,
};
use crate::services::recompute_service::{recompute_quality_flags, RecomputeContext, RecomputeService, RecomputeServiceError};
use crate::services::retry_executor::{RetryExecutor, RetryExecutorError, RetryResultStatus};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Retry(#[from] RetryExecutorError),
    #[error(transparent)]
    Recompute(#[from] RecomputeServiceError),
    #[error("incident db error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub incident_id: Uuid,
    pub retry_success: bool,
    pub final_status: String,
    pub is_resolved: bool,
    pub is_reclassified: bool,
    pub is_exhausted: bool,
    pub is_recompute_limited: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOrchestrationSummary {
    pub claimed: u64,
    pub retry_success: u64,
    pub retry_fail: u64,
    pub resolved: u64,
    pub reclassified: u64,
    pub exhausted: u64,
    pub recompute_limited: u64,
    pub errors: u64,
}

/// What `recompute_quality_flags` needs, pulled back out of an incident's
/// stored `routed_payload.normalized_inputs`. A provider that re-runs
/// extraction/validation/calculation for real is a later addition; this one
/// only ever sees what was captured at incident-creation time.
pub trait RecomputeContextProvider: Send + Sync {
    fn context_for(&self, incident: &Incident) -> RecomputeContext;
}

pub struct StoredPayloadContextProvider;

impl RecomputeContextProvider for StoredPayloadContextProvider {
    fn context_for(&self, incident: &Incident) -> RecomputeContext {
        let normalized = incident
            .routed_payload
            .as_ref()
            .and_then(|p| p.get("normalized_inputs"))
            .cloned()
            .unwrap_or(serde_json::json!({}));

        let extraction = normalized
            .get("extraction")
            .and_then(|v| serde_json::from_value::<ExtractionInput>(v.clone()).ok())
            .unwrap_or_default();
        let validation = normalized
            .get("validation")
            .and_then(|v| serde_json::from_value::<ValidationInput>(v.clone()).ok())
            .unwrap_or_default();
        let calculation = normalized
            .get("calculation")
            .and_then(|v| serde_json::from_value::<CalculationInput>(v.clone()).ok())
            .unwrap_or_default();
        let calculation_error = normalized
            .get("calculation_error")
            .and_then(|v| serde_json::from_value::<CalculationErrorInput>(v.clone()).ok())
            .unwrap_or_default();
        let debug_meta = normalized
            .get("debug_meta")
            .and_then(|v| serde_json::from_value::<DebugMetaInput>(v.clone()).ok())
            .unwrap_or_default();

        RecomputeContext {
            extraction,
            validation,
            calculation,
            calculation_error,
            debug_meta,
        }
    }
}

pub struct RetryOrchestrator<'a> {
    db: &'a DatabaseConnection,
    thresholds: &'a Thresholds,
    executor: RetryExecutor,
    context_provider: Box<dyn RecomputeContextProvider>,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(db: &'a DatabaseConnection, thresholds: &'a Thresholds) -> Self {
        Self {
            db,
            thresholds,
            executor: RetryExecutor::new(thresholds.retry.clone()),
            context_provider: Box::new(StoredPayloadContextProvider),
        }
    }

    pub fn with_parts(
        db: &'a DatabaseConnection,
        thresholds: &'a Thresholds,
        executor: RetryExecutor,
        context_provider: Box<dyn RecomputeContextProvider>,
    ) -> Self {
        Self { db, thresholds, executor, context_provider }
    }

    async fn mark_recompute_limit_exceeded(&self, incident_id: Uuid, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let Some(existing) = incidents::Entity::find_by_id(incident_id).one(self.db).await? else {
            return Ok(());
        };
        let mut active: incidents::ActiveModel = existing.into();
        active.status = Set("OPEN".to_string());
        active.resolution_reason = Set(Some(ResolutionReason::RecomputeLimitExceeded.as_str().to_string()));
        active.updated_at = Set(now);
        active.update(self.db).await?;
        Ok(())
    }

    async fn clear_retry_lock(&self, incident_id: Uuid) -> Result<(), OrchestratorError> {
        let Some(existing) = incidents::Entity::find_by_id(incident_id).one(self.db).await? else {
            return Ok(());
        };
        let mut active: incidents::ActiveModel = existing.into();
        active.retry_lock_until = Set(None);
        active.retry_lock_by = Set(None);
        active.update(self.db).await?;
        Ok(())
    }

    /// Claim → retry → (on success) recompute, for one incident. Never
    /// raises on a missing incident — callers get `final_status="UNKNOWN"`.
    pub async fn process_incident(
        &self,
        incident_id: Uuid,
        context_override: Option<RecomputeContext>,
        now: DateTime<Utc>,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let Some(model) = incidents::Entity::find_by_id(incident_id).one(self.db).await? else {
            return Ok(OrchestrationResult {
                incident_id,
                retry_success: false,
                final_status: "UNKNOWN".to_string(),
                is_resolved: false,
                is_reclassified: false,
                is_exhausted: false,
                is_recompute_limited: false,
                error_message: Some(format!("incident {incident_id} not found")),
            });
        };

        let incident = Incident::from(model);
        let retry_result = self.executor.execute(&incident);
        self.executor.apply_result(self.db, incident_id, &retry_result, now).await?;

        if retry_result.status != RetryResultStatus::Success {
            let refreshed = incidents::Entity::find_by_id(incident_id).one(self.db).await?;
            let is_exhausted = refreshed.as_ref().map(|m| m.retry_exhausted_at.is_some()).unwrap_or(false);
            return Ok(OrchestrationResult {
                incident_id,
                retry_success: false,
                final_status: refreshed.map(|m| m.status).unwrap_or_default(),
                is_resolved: false,
                is_reclassified: false,
                is_exhausted,
                is_recompute_limited: false,
                error_message: None,
            });
        }

        let refreshed = incidents::Entity::find_by_id(incident_id)
            .one(self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(incident_id.to_string()))?;
        let incident = Incident::from(refreshed);

        let current_recompute_count = incident.recompute_count as u32;
        if current_recompute_count >= self.thresholds.recompute.max_count {
            self.mark_recompute_limit_exceeded(incident_id, now).await?;
            tracing::warn!(%incident_id, current_recompute_count, "recompute limit exceeded");
            return Ok(OrchestrationResult {
                incident_id,
                retry_success: true,
                final_status: "OPEN".to_string(),
                is_resolved: false,
                is_reclassified: false,
                is_exhausted: false,
                is_recompute_limited: true,
                error_message: None,
            });
        }

        let context = context_override.unwrap_or_else(|| self.context_provider.context_for(&incident));
        let scorer = Scorer::new(self.thresholds);
        let recompute_result = recompute_quality_flags(&scorer, &context);

        let recompute_service = RecomputeService::new(self.db);
        recompute_service.apply_recompute_result(incident_id, &recompute_result, now).await?;

        let final_status = incidents::Entity::find_by_id(incident_id)
            .one(self.db)
            .await?
            .map(|m| m.status)
            .unwrap_or_default();

        Ok(OrchestrationResult {
            incident_id,
            retry_success: true,
            final_status,
            is_resolved: recompute_result.is_resolved,
            is_reclassified: recompute_result.new_primary_flag.as_deref() != Some(incident.primary_flag.as_str())
                && !recompute_result.is_resolved,
            is_exhausted: false,
            is_recompute_limited: false,
            error_message: None,
        })
    }

    pub async fn run_batch(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<BatchOrchestrationSummary, OrchestratorError> {
        let mut summary = BatchOrchestrationSummary::default();
        if kill_switch::global().check("retry_lookup").is_err() {
            tracing::warn!(tenant_id, "retry_lookup kill-switch tripped, skipping batch");
            return Ok(summary);
        }
        let claimed = self.executor.claim(self.db, tenant_id, now, limit).await?;
        summary.claimed = claimed.len() as u64;

        for model in claimed {
            match self.process_incident(model.id, None, now).await {
                Ok(result) => {
                    if result.error_message.is_some() {
                        summary.errors += 1;
                    } else if result.retry_success {
                        summary.retry_success += 1;
                        if result.is_resolved {
                            summary.resolved += 1;
                        }
                        if result.is_reclassified {
                            summary.reclassified += 1;
                        }
                        if result.is_recompute_limited {
                            summary.recompute_limited += 1;
                        }
                    } else {
                        summary.retry_fail += 1;
                        if result.is_exhausted {
                            summary.exhausted += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(incident_id = %model.id, error = %e, "orchestrator failed to process incident");
                    summary.errors += 1;
                    let _ = self.clear_retry_lock(model.id).await;
                }
            }
        }

        tracing::info!(
            tenant_id,
            claimed = summary.claimed,
            retry_success = summary.retry_success,
            retry_fail = summary.retry_fail,
            resolved = summary.resolved,
            reclassified = summary.reclassified,
            exhausted = summary.exhausted,
            recompute_limited = summary.recompute_limited,
            errors = summary.errors,
            "orchestration batch complete"
        );
        Ok(summary)
    }

    /// Crash recovery: an incident can be left in `PENDING_RECOMPUTE` if the
    /// process died between the retry executor's write and the recompute
    /// call. Sweeps rows untouched for longer than the stuck threshold.
    pub async fn process_pending_recomputes(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<u64, OrchestratorError> {
        let threshold = now - Duration::minutes(self.thresholds.recovery.stuck_minutes);
        let stuck = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::Status.eq("PENDING_RECOMPUTE"))
            .filter(incidents::Column::UpdatedAt.lt(threshold))
            .limit(limit)
            .all(self.db)
            .await?;

        if stuck.is_empty() {
            return Ok(0);
        }

        let mut processed = 0u64;
        for model in stuck {
            let incident_id = model.id;
            let incident = Incident::from(model);
            let current_recompute_count = incident.recompute_count as u32;

            if current_recompute_count >= self.thresholds.recompute.max_count {
                self.mark_recompute_limit_exceeded(incident_id, now).await?;
                processed += 1;
                continue;
            }

            let context = self.context_provider.context_for(&incident);
            let scorer = Scorer::new(self.thresholds);
            let recompute_result = recompute_quality_flags(&scorer, &context);
            let recompute_service = RecomputeService::new(self.db);
            recompute_service.apply_recompute_result(incident_id, &recompute_result, now).await?;
            processed += 1;
        }

        tracing::info!(tenant_id, processed, "processed stuck pending_recompute incidents");
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_payload_provider_falls_back_to_defaults_when_payload_absent() {
        let incident = Incident {
            id: Uuid::new_v4(),
            tenant_id: "t".to_string(),
            trace_id: None,
            fingerprint: "f".to_string(),
            dedupe_key: "d".to_string(),
            severity: "S1".to_string(),
            category: "CALC_BUG".to_string(),
            primary_flag: "CALC_BUG".to_string(),
            previous_primary_flag: None,
            secondary_flags: vec![],
            all_flags: vec![],
            action: serde_json::json!(null),
            action_hint: None,
            status: "PENDING_RECOMPUTE".to_string(),
            resolution_reason: None,
            routed_payload: None,
            feedback: None,
            occurrence_count: 1,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            retry_attempt_count: 1,
            retry_eligible_at: None,
            retry_lock_until: None,
            retry_lock_by: None,
            retry_exhausted_at: None,
            retry_success: true,
            retry_last_attempt_at: None,
            recompute_count: 0,
            reclassified_at: None,
            resolved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let provider = StoredPayloadContextProvider;
        let ctx = provider.context_for(&incident);
        assert!(ctx.extraction.field_confidences.is_empty());
        assert!(ctx.validation.missing_fields.is_empty());
    }
}
