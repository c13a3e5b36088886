//! C11 — replays `PENDING_RETRY` incidents against whatever provider the
//! caller plugs in. Race-safe via `SELECT ... FOR UPDATE SKIP LOCKED`
//! (Postgres is the only backend this stack targets). Never decides
//! `RESOLVED` — that is C12's sole authority.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::config::RetryThresholds;
use crate::models::_entities::incidents;
use crate::models::incident::{Incident, IncidentStatus, ResolutionReason};

#[derive(Debug, thiserror::Error)]
#[error("retry executor db error: {0}")]
pub struct RetryExecutorError(pub String);

impl From<sea_orm::DbErr> for RetryExecutorError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryResultStatus {
    Success,
    Fail,
    Exception,
}

#[derive(Debug, Clone)]
pub struct RetryResult {
    pub status: RetryResultStatus,
    pub message: String,
}

/// `hostname:pid:uuid8`, for post-mortem diagnosis of which process held a
/// lock.
pub fn generate_worker_id() -> String {
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
    let hostname: String = hostname.chars().take(20).collect();
    let pid = std::process::id();
    let short_uuid = &Uuid::new_v4().simple().to_string()[..8];
    format!("{hostname}:{pid}:{short_uuid}")
}

/// Pluggable so tests can stand in for a real lookup provider without
/// wiring the extraction/validation pipeline end to end.
pub trait RetryLookupExecutor: Send + Sync {
    fn execute(&self, incident: &Incident) -> RetryResult;
}

/// Sprint-7.0-style placeholder: no provider wired yet, always fails.
/// Real provider dispatch (market-price / tariff lookups keyed off
/// `action.code`) is a later addition, tracked outside this engine's scope.
pub struct DefaultLookupExecutor;

impl RetryLookupExecutor for DefaultLookupExecutor {
    fn execute(&self, _incident: &Incident) -> RetryResult {
        RetryResult {
            status: RetryResultStatus::Fail,
            message: "no retry provider configured".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub claimed: u64,
    pub success: u64,
    pub fail: u64,
    pub exhausted: u64,
    pub errors: u64,
}

pub struct RetryExecutor {
    thresholds: RetryThresholds,
    executor: Arc<dyn RetryLookupExecutor>,
    pub worker_id: String,
}

impl RetryExecutor {
    pub fn new(thresholds: RetryThresholds) -> Self {
        Self {
            thresholds,
            executor: Arc::new(DefaultLookupExecutor),
            worker_id: generate_worker_id(),
        }
    }

    pub fn with_executor(thresholds: RetryThresholds, executor: Arc<dyn RetryLookupExecutor>, worker_id: Option<String>) -> Self {
        Self {
            thresholds,
            executor,
            worker_id: worker_id.unwrap_or_else(generate_worker_id),
        }
    }

    fn backoff_minutes(&self, attempt_count: u32) -> i64 {
        let schedule = &self.thresholds.backoff_minutes;
        let idx = (attempt_count as usize).min(schedule.len().saturating_sub(1));
        schedule.get(idx).copied().unwrap_or(1440)
    }

    /// Claims up to `limit` eligible incidents under a single transaction's
    /// row locks, skipping rows a concurrent claimant already holds.
    pub async fn claim(
        &self,
        db: &DatabaseConnection,
        tenant_id: &str,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<incidents::Model>, RetryExecutorError> {
        let lock_expiry = now + Duration::minutes(self.thresholds.lock_minutes);
        let txn = db.begin().await?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"SELECT id FROM incidents
               WHERE tenant_id = $1
                 AND status = 'PENDING_RETRY'
                 AND retry_eligible_at <= $2
                 AND (retry_lock_until IS NULL OR retry_lock_until < $2)
                 AND retry_exhausted_at IS NULL
               ORDER BY retry_eligible_at ASC
               LIMIT $3
               FOR UPDATE SKIP LOCKED"#,
            [tenant_id.into(), now.into(), (limit as i64).into()],
        );
        let rows = txn.query_all(stmt).await?;
        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid>("", "id"))
            .collect::<Result<_, _>>()?;

        if ids.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        incidents::Entity::update_many()
            .col_expr(incidents::Column::RetryLockUntil, Expr::value(lock_expiry))
            .col_expr(incidents::Column::RetryLockBy, Expr::value(self.worker_id.clone()))
            .filter(incidents::Column::Id.is_in(ids.clone()))
            .exec(&txn)
            .await?;

        let claimed = incidents::Entity::find()
            .filter(incidents::Column::Id.is_in(ids))
            .order_by_asc(incidents::Column::RetryEligibleAt)
            .all(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(tenant_id, claimed = claimed.len(), "retry executor claimed incidents");
        Ok(claimed)
    }

    pub fn execute(&self, incident: &Incident) -> RetryResult {
        self.executor.execute(incident)
    }

    /// The invariant that makes this engine correct: success moves to
    /// `PENDING_RECOMPUTE`, never `RESOLVED`. Fail/exception advances the
    /// backoff schedule or exhausts after the 4th attempt.
    pub async fn apply_result(
        &self,
        db: &DatabaseConnection,
        incident_id: Uuid,
        result: &RetryResult,
        now: DateTime<Utc>,
    ) -> Result<(), RetryExecutorError> {
        let Some(existing) = incidents::Entity::find_by_id(incident_id).one(db).await? else {
            tracing::error!(%incident_id, "retry executor: incident not found");
            return Ok(());
        };

        let mut active: incidents::ActiveModel = existing.clone().into();
        active.retry_last_attempt_at = Set(Some(now));
        active.retry_lock_until = Set(None);
        active.retry_lock_by = Set(None);
        active.updated_at = Set(now);

        if result.status == RetryResultStatus::Success {
            active.status = Set(IncidentStatus::PendingRecompute.as_str().to_string());
            active.retry_success = Set(true);
            active.retry_eligible_at = Set(None);
        } else {
            active.retry_success = Set(false);
            let new_attempt = existing.retry_attempt_count + 1;
            active.retry_attempt_count = Set(new_attempt);

            if new_attempt as u32 >= self.thresholds.max_attempts {
                active.status = Set(IncidentStatus::Open.as_str().to_string());
                active.retry_eligible_at = Set(None);
                active.retry_exhausted_at = Set(Some(now));
                active.resolution_reason = Set(Some(ResolutionReason::RetryExhausted.as_str().to_string()));
            } else {
                let backoff = self.backoff_minutes((new_attempt - 1) as u32);
                active.retry_eligible_at = Set(Some(now + Duration::minutes(backoff)));
                active.status = Set(IncidentStatus::PendingRetry.as_str().to_string());
            }
        }

        active.update(db).await?;
        Ok(())
    }

    /// Claim, execute, apply — one incident's failure never aborts the
    /// rest of the batch.
    pub async fn run_batch(
        &self,
        db: &DatabaseConnection,
        tenant_id: &str,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<BatchSummary, RetryExecutorError> {
        let mut summary = BatchSummary::default();
        let claimed = self.claim(db, tenant_id, now, limit).await?;
        summary.claimed = claimed.len() as u64;

        for model in claimed {
            let current_attempt = model.retry_attempt_count;
            let incident = Incident::from(model.clone());
            let result = self.execute(&incident);
            let will_exhaust = result.status != RetryResultStatus::Success
                && (current_attempt + 1) as u32 >= self.thresholds.max_attempts;

            match self.apply_result(db, model.id, &result, now).await {
                Ok(()) => match result.status {
                    RetryResultStatus::Success => summary.success += 1,
                    _ if will_exhaust => summary.exhausted += 1,
                    _ => summary.fail += 1,
                },
                Err(e) => {
                    tracing::error!(incident_id = %model.id, error = %e, "retry executor apply_result failed");
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            tenant_id,
            claimed = summary.claimed,
            success = summary.success,
            fail = summary.fail,
            exhausted = summary.exhausted,
            errors = summary.errors,
            "retry batch complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_has_three_colon_separated_parts() {
        let id = generate_worker_id();
        assert_eq!(id.split(':').count(), 3);
    }

    #[test]
    fn backoff_schedule_clamps_to_last_entry_beyond_range() {
        let executor = RetryExecutor::new(RetryThresholds::default());
        assert_eq!(executor.backoff_minutes(0), 30);
        assert_eq!(executor.backoff_minutes(2), 360);
        assert_eq!(executor.backoff_minutes(99), 1440);
    }

    #[test]
    fn default_executor_always_fails() {
        let executor = DefaultLookupExecutor;
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
            status: "PENDING_RETRY".to_string(),
            resolution_reason: None,
            routed_payload: None,
            feedback: None,
            occurrence_count: 1,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            retry_attempt_count: 0,
            retry_eligible_at: None,
            retry_lock_until: None,
            retry_lock_by: None,
            retry_exhausted_at: None,
            retry_success: false,
            retry_last_attempt_at: None,
            recompute_count: 0,
            reclassified_at: None,
            resolved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(executor.execute(&incident).status, RetryResultStatus::Fail);
    }
}
