//! Cross-module, DB-backed scenarios. Each test stands up a fresh schema
//! via `loco_rs::testing::db::setup`, drives two or three services against
//! it, and checks the state the orchestrator left behind — the things a
//! unit test on a single pure function can't see.

use std::sync::Arc;

use chrono::Utc;
use loco_rs::testing;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::str::FromStr;
use uuid::Uuid;

use invoice_qa_engine::config::{RetryThresholds, Thresholds};
use invoice_qa_engine::models::_entities::incidents;
use invoice_qa_engine::services::bulk_importer::parse_csv;
use invoice_qa_engine::services::market_price_admin_service::{MarketPriceAdminService, UpsertInput};
use invoice_qa_engine::services::retry_executor::{RetryExecutor, RetryLookupExecutor, RetryResult, RetryResultStatus};
use invoice_qa_engine::services::retry_orchestrator::{RecomputeContext, RecomputeContextProvider, RetryOrchestrator};
use invoice_qa_engine::services::quality_scorer::{
    CalculationErrorInput, CalculationInput, DebugMetaInput, ExtractionInput, ValidationInput,
};

async fn setup_db() -> DatabaseConnection {
    let config = loco_rs::config::Config::new("test").expect("loads test config");
    testing::db::setup(&config.database).await.expect("migrates test database")
}

fn base_incident(status: &str, retry_attempt_count: i32) -> incidents::ActiveModel {
    let now = Utc::now();
    incidents::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set("default".to_string()),
        trace_id: Set(None),
        fingerprint: Set(format!("fp-{}", Uuid::new_v4())),
        dedupe_key: Set(Uuid::new_v4().to_string()),
        severity: Set("S2".to_string()),
        category: Set("MISMATCH".to_string()),
        primary_flag: Set("INVOICE_TOTAL_MISMATCH".to_string()),
        previous_primary_flag: Set(None),
        secondary_flags: Set(serde_json::json!([])),
        all_flags: Set(serde_json::json!(["INVOICE_TOTAL_MISMATCH"])),
        action: Set(serde_json::json!({"type": "RETRY_LOOKUP", "owner": "qa-ops", "code": "INVOICE_TOTAL_MISMATCH", "hint_text": "retry"})),
        action_hint: Set(Some("retry".to_string())),
        status: Set(status.to_string()),
        resolution_reason: Set(None),
        routed_payload: Set(Some(serde_json::json!({"normalized_inputs": {}}))),
        feedback: Set(None),
        occurrence_count: Set(1),
        first_seen_at: Set(now),
        last_seen_at: Set(now),
        retry_attempt_count: Set(retry_attempt_count),
        retry_eligible_at: Set(Some(now - chrono::Duration::minutes(1))),
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
    }
}

struct AlwaysFail;
impl RetryLookupExecutor for AlwaysFail {
    fn execute(&self, _incident: &invoice_qa_engine::models::incident::Incident) -> RetryResult {
        RetryResult { status: RetryResultStatus::Fail, message: "lookup still unavailable".to_string() }
    }
}

struct AlwaysSucceed;
impl RetryLookupExecutor for AlwaysSucceed {
    fn execute(&self, _incident: &invoice_qa_engine::models::incident::Incident) -> RetryResult {
        RetryResult { status: RetryResultStatus::Success, message: "lookup resolved".to_string() }
    }
}

/// Hands back a context with no mismatch at all, so recompute always
/// resolves regardless of what's stashed in `routed_payload`.
struct CleanContextProvider;
impl RecomputeContextProvider for CleanContextProvider {
    fn context_for(&self, _incident: &invoice_qa_engine::models::incident::Incident) -> RecomputeContext {
        RecomputeContext {
            extraction: ExtractionInput::default(),
            validation: ValidationInput::default(),
            calculation: CalculationInput::default(),
            calculation_error: CalculationErrorInput::default(),
            debug_meta: DebugMetaInput::default(),
        }
    }
}

/// E4 — an incident already on its 3rd failed attempt hits the lookup
/// stub once more, fails, and must exhaust: `attempt_count` becomes 4,
/// status reverts to `OPEN`, `retry_exhausted_at` is set, and the
/// resolution reason records why.
#[tokio::test]
async fn e4_retry_exhaust_on_fourth_failed_attempt() {
    let db = setup_db().await;
    let thresholds = Thresholds::default();
    let incident = base_incident("PENDING_RETRY", 3).insert(&db).await.unwrap();

    let executor = RetryExecutor::with_executor(RetryThresholds::default(), Arc::new(AlwaysFail), None);
    let orchestrator = RetryOrchestrator::with_parts(&db, &thresholds, executor, Box::new(CleanContextProvider));

    let now = Utc::now();
    let result = orchestrator.process_incident(incident.id, None, now).await.unwrap();

    assert!(!result.retry_success);
    assert!(result.is_exhausted);
    assert_eq!(result.final_status, "OPEN");

    let refreshed = incidents::Entity::find_by_id(incident.id).one(&db).await.unwrap().unwrap();
    assert_eq!(refreshed.retry_attempt_count, 4);
    assert_eq!(refreshed.status, "OPEN");
    assert!(refreshed.retry_exhausted_at.is_some());
    assert_eq!(refreshed.resolution_reason.as_deref(), Some("retry_exhausted"));
}

/// E5 — a retry that succeeds moves to `PENDING_RECOMPUTE`, and a
/// recompute pass that turns up no critical flags resolves it: status
/// becomes `RESOLVED`, `retry_success` is true, and the resolution
/// reason is the recompute-authored one (never a retry-authored one).
#[tokio::test]
async fn e5_successful_retry_then_clean_recompute_resolves() {
    let db = setup_db().await;
    let thresholds = Thresholds::default();
    let incident = base_incident("PENDING_RETRY", 0).insert(&db).await.unwrap();

    let executor = RetryExecutor::with_executor(RetryThresholds::default(), Arc::new(AlwaysSucceed), None);
    let orchestrator = RetryOrchestrator::with_parts(&db, &thresholds, executor, Box::new(CleanContextProvider));

    let now = Utc::now();
    let result = orchestrator.process_incident(incident.id, None, now).await.unwrap();

    assert!(result.retry_success);
    assert!(result.is_resolved);
    assert_eq!(result.final_status, "RESOLVED");

    let refreshed = incidents::Entity::find_by_id(incident.id).one(&db).await.unwrap().unwrap();
    assert_eq!(refreshed.status, "RESOLVED");
    assert!(refreshed.retry_success);
    assert_eq!(refreshed.resolution_reason.as_deref(), Some("recompute_resolved"));
    assert_eq!(refreshed.recompute_count, 1);
    assert!(refreshed.resolved_at.is_some());
}

/// E6 — upserting the same period twice with an unchanged value/status is
/// a no-op (no new history row); a genuine value change with a
/// change_reason appends exactly one history row per change.
#[tokio::test]
async fn e6_upsert_writes_one_history_row_per_real_change() {
    let db = setup_db().await;
    let service = MarketPriceAdminService::new(&db);

    let insert_result = service
        .upsert_price(UpsertInput {
            price_type: "PTF".to_string(),
            period: "2026-01".to_string(),
            value: Decimal::from_str("2894.92").unwrap(),
            status: "provisional".to_string(),
            source: "manual".to_string(),
            change_reason: None,
            updated_by: "ops-1".to_string(),
            force_update: false,
        })
        .await
        .unwrap();
    assert!(insert_result.created);

    let update_result = service
        .upsert_price(UpsertInput {
            price_type: "PTF".to_string(),
            period: "2026-01".to_string(),
            value: Decimal::from_str("2900.00").unwrap(),
            status: "provisional".to_string(),
            source: "manual".to_string(),
            change_reason: Some("correction".to_string()),
            updated_by: "ops-1".to_string(),
            force_update: false,
        })
        .await
        .unwrap();
    assert!(update_result.changed);

    let noop_result = service
        .upsert_price(UpsertInput {
            price_type: "PTF".to_string(),
            period: "2026-01".to_string(),
            value: Decimal::from_str("2900.00").unwrap(),
            status: "provisional".to_string(),
            source: "manual".to_string(),
            change_reason: Some("correction".to_string()),
            updated_by: "ops-1".to_string(),
            force_update: false,
        })
        .await
        .unwrap();
    assert!(!noop_result.changed);

    let history = service.get_history("PTF", "2026-01").await.unwrap().unwrap();
    assert_eq!(history.len(), 2);
}

/// E9 — both rows pass row-level validation, but the second row's
/// `upsert_price` call is rejected (`FINAL_RECORD_PROTECTED`, changing a
/// final record's value without `force_update`). `strict_mode=true` must
/// roll back the first row's already-committed insert, not just report
/// `accepted_count=0` while leaving it in the store.
#[tokio::test]
async fn e9_bulk_import_strict_rolls_back_mid_batch_upsert_rejection() {
    let db = setup_db().await;
    let service = MarketPriceAdminService::new(&db);

    service
        .upsert_price(UpsertInput {
            price_type: "PTF".to_string(),
            period: "2025-02".to_string(),
            value: Decimal::from_str("2900.00").unwrap(),
            status: "final".to_string(),
            source: "manual".to_string(),
            change_reason: None,
            updated_by: "ops-1".to_string(),
            force_update: false,
        })
        .await
        .unwrap();

    let csv = "period,value,status\n2025-01,2894.92,provisional\n2025-02,2950.00,final\n";
    let rows = parse_csv(csv).unwrap();
    assert_eq!(rows.len(), 2);

    let result = service
        .apply_bulk_import(rows, "ops-1", "PTF", false, true, "csv_import", None)
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.accepted_count, 0);
    assert_eq!(result.rejected_count, 2);
    assert_eq!(result.rejected_rows.len(), 1);
    assert_eq!(result.rejected_rows[0].error_code, "FinalRecordProtected");

    assert!(service.get_by_key("PTF", "2025-01").await.unwrap().is_none());
    let untouched = service.get_by_key("PTF", "2025-02").await.unwrap().unwrap();
    assert_eq!(untouched.value, Decimal::from_str("2900.00").unwrap());
}

/// E8 — a 3-row CSV with one malformed decimal (`3,5`, comma instead of
/// period). `strict_mode=true` rolls the whole batch back: 0 accepted, 3
/// rejected. `strict_mode=false` accepts the 2 valid rows independently.
#[tokio::test]
async fn e8_bulk_import_strict_vs_lenient() {
    let csv = "period,value,status\n2025-01,2894.92,provisional\n2025-02,\"3,5\",provisional\n2025-03,2900.10,provisional\n";
    let rows = parse_csv(csv).unwrap();
    assert_eq!(rows.len(), 3);

    let db_strict = setup_db().await;
    let strict_service = MarketPriceAdminService::new(&db_strict);
    let strict_result = strict_service
        .apply_bulk_import(rows.clone(), "ops-1", "PTF", false, true, "csv_import", None)
        .await
        .unwrap();
    assert!(!strict_result.success);
    assert_eq!(strict_result.accepted_count, 0);
    assert_eq!(strict_result.rejected_count, 3);

    let db_lenient = setup_db().await;
    let lenient_service = MarketPriceAdminService::new(&db_lenient);
    let lenient_result = lenient_service
        .apply_bulk_import(rows, "ops-1", "PTF", false, false, "csv_import", None)
        .await
        .unwrap();
    assert!(!lenient_result.success);
    assert_eq!(lenient_result.accepted_count, 2);
    assert_eq!(lenient_result.rejected_count, 1);
}
