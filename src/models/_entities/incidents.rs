use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "incidents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub tenant_id: String,
    pub trace_id: Option<String>,
    pub fingerprint: String,
    pub dedupe_key: String,
    pub severity: String,
    pub category: String,
    pub primary_flag: String,
    pub previous_primary_flag: Option<String>,
    /// JSON array of secondary flag codes, in priority order.
    pub secondary_flags: Json,
    /// JSON array of every flag code observed on this invoice.
    pub all_flags: Json,
    /// JSON blob: {type, owner, code, hint_text}.
    pub action: Json,
    pub action_hint: Option<String>,
    pub status: String,
    pub resolution_reason: Option<String>,
    /// Best-effort persisted context used to reconstruct a
    /// RecomputeContext without rerunning extraction end to end.
    pub routed_payload: Option<Json>,
    pub feedback: Option<Json>,
    pub occurrence_count: i32,
    pub first_seen_at: DateTimeUtc,
    pub last_seen_at: DateTimeUtc,
    pub retry_attempt_count: i32,
    pub retry_eligible_at: Option<DateTimeUtc>,
    pub retry_lock_until: Option<DateTimeUtc>,
    pub retry_lock_by: Option<String>,
    pub retry_exhausted_at: Option<DateTimeUtc>,
    pub retry_success: bool,
    pub retry_last_attempt_at: Option<DateTimeUtc>,
    pub recompute_count: i32,
    pub reclassified_at: Option<DateTimeUtc>,
    pub resolved_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
