use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::_entities::incidents;

/// Closed status enum for the incident lifecycle. `Resolved` is produced
/// automatically by C12 (recompute) or directly by an operator's manual
/// resolution via the admin surface; no other path sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Open,
    Ack,
    PendingRetry,
    PendingRecompute,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "OPEN",
            IncidentStatus::Ack => "ACK",
            IncidentStatus::PendingRetry => "PENDING_RETRY",
            IncidentStatus::PendingRecompute => "PENDING_RECOMPUTE",
            IncidentStatus::Resolved => "RESOLVED",
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(IncidentStatus::Open),
            "ACK" => Ok(IncidentStatus::Ack),
            "PENDING_RETRY" => Ok(IncidentStatus::PendingRetry),
            "PENDING_RECOMPUTE" => Ok(IncidentStatus::PendingRecompute),
            "RESOLVED" => Ok(IncidentStatus::Resolved),
            other => Err(format!("unknown incident status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub tenant_id: String,
    pub trace_id: Option<String>,
    pub fingerprint: String,
    pub dedupe_key: String,
    pub severity: String,
    pub category: String,
    pub primary_flag: String,
    pub previous_primary_flag: Option<String>,
    pub secondary_flags: Vec<String>,
    pub all_flags: Vec<String>,
    pub action: serde_json::Value,
    pub action_hint: Option<String>,
    pub status: String,
    pub resolution_reason: Option<String>,
    pub routed_payload: Option<serde_json::Value>,
    pub feedback: Option<serde_json::Value>,
    pub occurrence_count: i32,
    pub first_seen_at: chrono::DateTime<chrono::Utc>,
    pub last_seen_at: chrono::DateTime<chrono::Utc>,
    pub retry_attempt_count: i32,
    pub retry_eligible_at: Option<chrono::DateTime<chrono::Utc>>,
    pub retry_lock_until: Option<chrono::DateTime<chrono::Utc>>,
    pub retry_lock_by: Option<String>,
    pub retry_exhausted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub retry_success: bool,
    pub retry_last_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
    pub recompute_count: i32,
    pub reclassified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<incidents::Model> for Incident {
    fn from(m: incidents::Model) -> Self {
        Self {
            id: m.id,
            tenant_id: m.tenant_id,
            trace_id: m.trace_id,
            fingerprint: m.fingerprint,
            dedupe_key: m.dedupe_key,
            severity: m.severity,
            category: m.category,
            primary_flag: m.primary_flag,
            previous_primary_flag: m.previous_primary_flag,
            secondary_flags: serde_json::from_value(m.secondary_flags).unwrap_or_default(),
            all_flags: serde_json::from_value(m.all_flags).unwrap_or_default(),
            action: m.action,
            action_hint: m.action_hint,
            status: m.status,
            resolution_reason: m.resolution_reason,
            routed_payload: m.routed_payload,
            feedback: m.feedback,
            occurrence_count: m.occurrence_count,
            first_seen_at: m.first_seen_at,
            last_seen_at: m.last_seen_at,
            retry_attempt_count: m.retry_attempt_count,
            retry_eligible_at: m.retry_eligible_at,
            retry_lock_until: m.retry_lock_until,
            retry_lock_by: m.retry_lock_by,
            retry_exhausted_at: m.retry_exhausted_at,
            retry_success: m.retry_success,
            retry_last_attempt_at: m.retry_last_attempt_at,
            recompute_count: m.recompute_count,
            reclassified_at: m.reclassified_at,
            resolved_at: m.resolved_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl Incident {
    pub fn status_enum(&self) -> Option<IncidentStatus> {
        self.status.parse().ok()
    }
}

/// Closed resolution-reason enum (§4.12). `RECLASSIFIED` is informational
/// only — it is never used to mark an incident resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    RecomputeResolved,
    ManualResolved,
    AutoResolved,
    RecomputeLimitExceeded,
    RetryExhausted,
    Reclassified,
}

impl ResolutionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionReason::RecomputeResolved => "recompute_resolved",
            ResolutionReason::ManualResolved => "manual_resolved",
            ResolutionReason::AutoResolved => "auto_resolved",
            ResolutionReason::RecomputeLimitExceeded => "recompute_limit_exceeded",
            ResolutionReason::RetryExhausted => "retry_exhausted",
            ResolutionReason::Reclassified => "reclassified",
        }
    }

    /// The subset counted toward MTTR — a reclassification is a status
    /// event, not a resolution.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ResolutionReason::RecomputeResolved
                | ResolutionReason::ManualResolved
                | ResolutionReason::AutoResolved
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_set_excludes_reclassified_and_terminal_non_resolutions() {
        assert!(ResolutionReason::RecomputeResolved.is_resolved());
        assert!(ResolutionReason::ManualResolved.is_resolved());
        assert!(ResolutionReason::AutoResolved.is_resolved());
        assert!(!ResolutionReason::Reclassified.is_resolved());
        assert!(!ResolutionReason::RetryExhausted.is_resolved());
        assert!(!ResolutionReason::RecomputeLimitExceeded.is_resolved());
    }
}
