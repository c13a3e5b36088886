//! C12 — re-scores an invoice after a successful retry and is the sole
//! authority allowed to set `status=RESOLVED`. Three outcomes: the new
//! score carries no S1/S2 flags (resolved), the primary flag changed
//! (reclassified, status untouched), or it didn't (no-op besides the
//! recompute counter).

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::models::_entities::incidents;
use crate::models::incident::ResolutionReason;
use crate::services::quality_scorer::{
    CalculationErrorInput, CalculationInput, DebugMetaInput, ExtractionInput, Scorer, ScorerInput, Severity,
    ValidationInput,
};

#[derive(Debug, thiserror::Error)]
#[error("recompute service db error: {0}")]
pub struct RecomputeServiceError(pub String);

impl From<sea_orm::DbErr> for RecomputeServiceError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self(e.to_string())
    }
}

/// Inputs to a second scoring pass. Mirrors the extraction/validation/
/// calculation context `incident_service` stashes in `routed_payload`
/// at creation time.
pub struct RecomputeContext {
    pub extraction: ExtractionInput,
    pub validation: ValidationInput,
    pub calculation: CalculationInput,
    pub calculation_error: CalculationErrorInput,
    pub debug_meta: DebugMetaInput,
}

#[derive(Debug, Clone)]
pub struct RecomputeResult {
    pub new_all_flags: Vec<String>,
    pub new_primary_flag: Option<String>,
    pub new_category: Option<&'static str>,
    pub new_severity: Option<Severity>,
    pub quality_score: i32,
    pub is_resolved: bool,
    pub is_reclassified: bool,
    pub old_primary_flag: Option<String>,
}

/// Re-runs the scorer and keeps only S1/S2 flags — the same critical-only
/// filter the original incident was created from.
pub fn recompute_quality_flags(scorer: &Scorer, context: &RecomputeContext) -> RecomputeResult {
    let quality = scorer.score(ScorerInput {
        extraction: &context.extraction,
        validation: &context.validation,
        calculation: &context.calculation,
        calculation_error: &context.calculation_error,
        debug_meta: &context.debug_meta,
    });

    let critical: Vec<&crate::services::quality_scorer::FlagDetail> = quality
        .flag_details
        .iter()
        .filter(|f| matches!(f.severity, Severity::S1 | Severity::S2))
        .collect();

    if critical.is_empty() {
        return RecomputeResult {
            new_all_flags: vec![],
            new_primary_flag: None,
            new_category: None,
            new_severity: None,
            quality_score: quality.score,
            is_resolved: true,
            is_reclassified: false,
            old_primary_flag: None,
        };
    }

    RecomputeResult {
        new_all_flags: critical.iter().map(|f| f.code.clone()).collect(),
        new_primary_flag: quality.primary_flag.clone(),
        new_category: quality.category,
        new_severity: quality.primary_flag.as_ref().and_then(|p| {
            critical.iter().find(|f| &f.code == p).map(|f| f.severity)
        }),
        quality_score: quality.score,
        is_resolved: false,
        is_reclassified: false,
        old_primary_flag: None,
    }
}

pub struct RecomputeService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl<'a> RecomputeService<'a> {
    pub fn new(db: &'a sea_orm::DatabaseConnection) -> Self {
        Self { db }
    }

    /// `recompute_count` increments exactly once per call, before the
    /// decision matrix branches — every call is a recompute attempt
    /// regardless of outcome.
    pub async fn apply_recompute_result(
        &self,
        incident_id: uuid::Uuid,
        result: &RecomputeResult,
        now: DateTime<Utc>,
    ) -> Result<bool, RecomputeServiceError> {
        let Some(existing) = incidents::Entity::find_by_id(incident_id).one(self.db).await? else {
            tracing::error!(%incident_id, "recompute service: incident not found");
            return Ok(false);
        };

        let old_primary = existing.primary_flag.clone();
        let mut active: incidents::ActiveModel = existing.into();
        let prior_count = match &active.recompute_count {
            sea_orm::ActiveValue::Set(v) | sea_orm::ActiveValue::Unchanged(v) => *v,
            sea_orm::ActiveValue::NotSet => 0,
        };
        active.recompute_count = Set(prior_count + 1);
        active.updated_at = Set(now);

        if result.is_resolved {
            active.status = Set("RESOLVED".to_string());
            active.resolved_at = Set(Some(now));
            active.resolution_reason = Set(Some(ResolutionReason::RecomputeResolved.as_str().to_string()));
            active.update(self.db).await?;
            tracing::info!(%incident_id, old_primary, "incident resolved by recompute");
            return Ok(true);
        }

        if result.new_primary_flag.as_deref() != Some(old_primary.as_str()) {
            active.previous_primary_flag = Set(Some(old_primary.clone()));
            active.reclassified_at = Set(Some(now));
            active.primary_flag = Set(result.new_primary_flag.clone().unwrap_or_default());
            active.category = Set(result.new_category.unwrap_or("VALIDATION_FAIL").to_string());
            active.severity = Set(format!("{:?}", result.new_severity.unwrap_or(Severity::S2)));
            active.all_flags = Set(serde_json::json!(result.new_all_flags));
            let secondary: Vec<&String> = result
                .new_all_flags
                .iter()
                .filter(|f| Some(f.as_str()) != result.new_primary_flag.as_deref())
                .collect();
            active.secondary_flags = Set(serde_json::json!(secondary));
            // RECLASSIFIED is a status event, not a resolution — status is left
            // untouched and this never lands in the resolved set.
            active.resolution_reason = Set(Some(ResolutionReason::Reclassified.as_str().to_string()));
            active.update(self.db).await?;
            tracing::warn!(%incident_id, old_primary, new_primary = ?result.new_primary_flag, "incident reclassified");
            return Ok(true);
        }

        active.update(self.db).await?;
        tracing::info!(%incident_id, old_primary, "recompute: primary flag unchanged");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;

    fn empty_context() -> RecomputeContext {
        RecomputeContext {
            extraction: ExtractionInput::default(),
            validation: ValidationInput::default(),
            calculation: CalculationInput::default(),
            calculation_error: CalculationErrorInput::default(),
            debug_meta: DebugMetaInput::default(),
        }
    }

    #[test]
    fn no_critical_flags_means_resolved() {
        let t = Thresholds::default();
        let scorer = Scorer::new(&t);
        let result = recompute_quality_flags(&scorer, &empty_context());
        assert!(result.is_resolved);
        assert!(result.new_all_flags.is_empty());
        assert!(result.new_primary_flag.is_none());
    }

    #[test]
    fn consumption_missing_survives_as_primary_flag() {
        let t = Thresholds::default();
        let scorer = Scorer::new(&t);
        let mut ctx = empty_context();
        ctx.validation.missing_fields.push("consumption_kwh".to_string());
        let result = recompute_quality_flags(&scorer, &ctx);
        assert!(!result.is_resolved);
        assert_eq!(result.new_primary_flag.as_deref(), Some("CONSUMPTION_MISSING"));
    }
}
