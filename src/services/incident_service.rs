//! C10 — turns a [`QualityScore`] into an incident row, or bumps an
//! existing one. The scorer (C9) already picked the primary/secondary
//! flags and the action recommendation; this module only owns identity
//! (fingerprint/dedupe), dedup lookup, and the stored details blob.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder, Set};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::_entities::incidents;
use crate::models::incident::{Incident, IncidentStatus};
use crate::services::quality_scorer::{QualityScore, ScorerInput};

/// The fields of an invoice that identify it for dedup purposes, independent
/// of which flags fired.
pub struct InvoiceIdentity<'a> {
    pub supplier: &'a str,
    pub invoice_no: &'a str,
    pub period: &'a str,
    pub consumption_kwh: f64,
    pub total_amount: f64,
}

/// `hex(sha256("supplier|invoice_no|period|consumption:.2f|total:.2f"))[..16]`.
pub fn compute_fingerprint(identity: &InvoiceIdentity) -> String {
    let raw = format!(
        "{}|{}|{}|{:.2}|{:.2}",
        identity.supplier.trim().to_lowercase(),
        identity.invoice_no.trim(),
        identity.period.trim(),
        identity.consumption_kwh,
        identity.total_amount,
    );
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Full 64 hex chars — not truncated, unlike the fingerprint it is built
/// from.
pub fn compute_dedupe_key(tenant_id: &str, category: Option<&str>, period: &str, fingerprint: &str) -> String {
    let tenant = if tenant_id.trim().is_empty() { "default" } else { tenant_id };
    let raw = format!("{}|{}|{}|{}", tenant, category.unwrap_or("UNKNOWN"), period, fingerprint);
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Category for a single flag code, independent of whether it is primary —
/// used to label the secondary flags in the stored details blob. Mirrors
/// the primary mapping in the scorer (C9).
fn category_for_code(code: &str) -> &'static str {
    match code {
        "TARIFF_META_MISSING" => "TARIFF_META_MISSING",
        "TARIFF_LOOKUP_FAILED" | "DISTRIBUTION_MISSING" => "TARIFF_MISSING",
        "MARKET_PRICE_MISSING" => "PRICE_MISSING",
        "CONSUMPTION_MISSING" => "CONSUMPTION_MISSING",
        "CALC_BUG" => "CALC_BUG",
        "JSON_REPAIR_APPLIED" => "JSON_REPAIR",
        code if code.contains("MISMATCH") => "MISMATCH",
        code if code.contains("OUTLIER") => "OUTLIER",
        _ => "VALIDATION_FAIL",
    }
}

#[derive(Debug, thiserror::Error)]
#[error("incident service db error: {0}")]
pub struct IncidentServiceError(pub String);

impl From<sea_orm::DbErr> for IncidentServiceError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self(e.to_string())
    }
}

/// At most one incident is ever registered per invoice per scoring pass.
#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    /// No S1/S2 flag survived scoring — nothing to register.
    NoFlags,
    Created(Uuid),
    Bumped(Uuid),
}

const DEDUPE_WINDOW_HOURS: i64 = 24;

pub struct IncidentService<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> IncidentService<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_dedupe_candidate(
        &self,
        tenant_id: &str,
        dedupe_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<incidents::Model>, IncidentServiceError> {
        let window_start = now - Duration::hours(DEDUPE_WINDOW_HOURS);
        let candidate = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::DedupeKey.eq(dedupe_key))
            .filter(incidents::Column::Status.ne(IncidentStatus::Resolved.as_str()))
            .filter(incidents::Column::CreatedAt.gte(window_start))
            .order_by(incidents::Column::CreatedAt, Order::Desc)
            .one(self.db)
            .await?;
        Ok(candidate)
    }

    /// Registers one scoring pass's outcome. Returns `NoFlags` untouched
    /// when the scorer found nothing worth an incident.
    pub async fn register(
        &self,
        tenant_id: &str,
        trace_id: Option<&str>,
        identity: &InvoiceIdentity<'_>,
        quality: &QualityScore,
        inputs: &ScorerInput<'_>,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, IncidentServiceError> {
        let Some(primary_flag) = quality.primary_flag.clone() else {
            return Ok(RegisterOutcome::NoFlags);
        };
        let category = quality.category.unwrap_or("VALIDATION_FAIL");
        let fingerprint = compute_fingerprint(identity);
        let dedupe_key = compute_dedupe_key(tenant_id, Some(category), identity.period, &fingerprint);

        if let Some(existing) = self.find_dedupe_candidate(tenant_id, &dedupe_key, now).await? {
            let mut active: incidents::ActiveModel = existing.clone().into();
            active.occurrence_count = Set(existing.occurrence_count + 1);
            active.last_seen_at = Set(now);
            active.updated_at = Set(now);
            let updated = active.update(self.db).await?;
            return Ok(RegisterOutcome::Bumped(updated.id));
        }

        let severity = quality
            .flag_details
            .iter()
            .find(|f| f.code == primary_flag)
            .map(|f| format!("{:?}", f.severity))
            .unwrap_or_else(|| "S2".to_string());

        let secondary_categories: Vec<&'static str> =
            quality.secondary_flags.iter().map(|code| category_for_code(code)).collect();

        let action = quality.action.as_ref().map(|a| {
            json!({
                "type": a.action_type,
                "owner": a.owner,
                "code": a.code,
                "hint_text": a.hint_text,
            })
        });

        let details = json!({
            "primary_flag": primary_flag,
            "category": category,
            "all_flags": quality.flags,
            "flag_details": quality.flag_details.iter().map(|f| json!({
                "code": f.code,
                "severity": format!("{:?}", f.severity),
                "message": f.message,
                "deduction": f.deduction,
                "delta": f.delta,
                "ratio": f.ratio,
                "suspect_reason": f.suspect_reason,
            })).collect::<Vec<_>>(),
            "secondary_flags": quality.secondary_flags,
            "secondary_categories": secondary_categories,
            "quality_score": quality.score,
            "grade": format!("{:?}", quality.grade),
            "action": action,
            "action_hint": quality.action_hint,
            // Kept so a later recompute pass can rebuild a ScorerInput without
            // re-running extraction/validation/calculation from scratch.
            "normalized_inputs": {
                "extraction": inputs.extraction,
                "validation": inputs.validation,
                "calculation": inputs.calculation,
                "calculation_error": inputs.calculation_error,
                "debug_meta": inputs.debug_meta,
            },
        });

        let active = incidents::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id.to_string()),
            trace_id: Set(trace_id.map(|s| s.to_string())),
            fingerprint: Set(fingerprint),
            dedupe_key: Set(dedupe_key),
            severity: Set(severity),
            category: Set(category.to_string()),
            primary_flag: Set(primary_flag),
            previous_primary_flag: Set(None),
            secondary_flags: Set(json!(quality.secondary_flags)),
            all_flags: Set(json!(quality.flags)),
            action: Set(action.unwrap_or(json!(null))),
            action_hint: Set(quality.action_hint.clone()),
            status: Set(IncidentStatus::Open.as_str().to_string()),
            resolution_reason: Set(None),
            routed_payload: Set(Some(details)),
            feedback: Set(None),
            occurrence_count: Set(1),
            first_seen_at: Set(now),
            last_seen_at: Set(now),
            retry_attempt_count: Set(0),
            retry_eligible_at: Set(None),
            retry_lock_until: Set(None),
            retry_lock_by: Set(None),
            retry_exhausted_at: Set(None),
            retry_success: Set(false),
            retry_last_attempt_at: Set(None),
            recompute_count: Set(0),
            reclassified_at: Set(None),
            resolved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = active.insert(self.db).await?;
        Ok(RegisterOutcome::Created(inserted.id))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Incident>, IncidentServiceError> {
        Ok(incidents::Entity::find_by_id(id).one(self.db).await?.map(Incident::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_case_and_whitespace_insensitive_on_supplier() {
        let a = compute_fingerprint(&InvoiceIdentity {
            supplier: "Acme Energy",
            invoice_no: "INV-1",
            period: "2025-01",
            consumption_kwh: 100.0,
            total_amount: 250.0,
        });
        let b = compute_fingerprint(&InvoiceIdentity {
            supplier: "  acme energy  ",
            invoice_no: "INV-1",
            period: "2025-01",
            consumption_kwh: 100.0,
            total_amount: 250.0,
        });
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn dedupe_key_is_full_length_and_differs_from_fingerprint() {
        let fp = compute_fingerprint(&InvoiceIdentity {
            supplier: "Acme",
            invoice_no: "INV-2",
            period: "2025-02",
            consumption_kwh: 50.0,
            total_amount: 120.0,
        });
        let key = compute_dedupe_key("tenant-a", Some("CALC_BUG"), "2025-02", &fp);
        assert_eq!(key.len(), 64);
        assert_ne!(key, fp);
    }

    #[test]
    fn empty_tenant_id_falls_back_to_default() {
        let fp = "abcdef0123456789";
        let a = compute_dedupe_key("", Some("CALC_BUG"), "2025-02", fp);
        let b = compute_dedupe_key("default", Some("CALC_BUG"), "2025-02", fp);
        assert_eq!(a, b);
    }

    #[test]
    fn category_mapping_matches_scorer_rules() {
        assert_eq!(category_for_code("TARIFF_LOOKUP_FAILED"), "TARIFF_MISSING");
        assert_eq!(category_for_code("INVOICE_TOTAL_MISMATCH"), "MISMATCH");
        assert_eq!(category_for_code("MISSING_FIELDS"), "VALIDATION_FAIL");
    }
}
