//! C10/C14 admin surface: incident listing/status changes and operator
//! feedback, plus the feedback-calibration read path.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::patch;
use axum::Json;
use loco_rs::app::AppContext;
use loco_rs::prelude::*;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::Thresholds;
use crate::controllers::support::{admin_guard, error_response, error_response_with_field};
use crate::models::_entities::incidents;
use crate::models::incident::{Incident, IncidentStatus, ResolutionReason};
use crate::services::metrics_reporter::{compute_feedback_stats, validate_feedback, FeedbackValidationError, IncidentFeedback};

pub fn routes() -> Routes {
    Routes::new()
        .prefix("admin")
        .add("/incidents", get(list_incidents))
        .add("/incidents/:id", get(get_incident))
        .add("/incidents/:id", patch(update_status))
        .add("/incidents/:id/feedback", patch(submit_feedback))
        .add("/feedback-stats", get(feedback_stats))
}

#[derive(Debug, Deserialize)]
pub struct ListIncidentsQuery {
    status: Option<String>,
    severity: Option<String>,
    category: Option<String>,
    limit: Option<u64>,
}

async fn list_incidents(State(ctx): State<AppContext>, headers: HeaderMap, Query(q): Query<ListIncidentsQuery>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }

    let limit = q.limit.unwrap_or(100).clamp(1, 500);
    let mut select = incidents::Entity::find();
    if let Some(status) = &q.status {
        select = select.filter(incidents::Column::Status.eq(status.as_str()));
    }
    if let Some(severity) = &q.severity {
        select = select.filter(incidents::Column::Severity.eq(severity.as_str()));
    }
    if let Some(category) = &q.category {
        select = select.filter(incidents::Column::Category.eq(category.as_str()));
    }

    match select
        .order_by(incidents::Column::LastSeenAt, Order::Desc)
        .paginate(&ctx.db, limit)
        .fetch_page(0)
        .await
    {
        Ok(rows) => {
            let items: Vec<Incident> = rows.into_iter().map(Incident::from).collect();
            Json(json!({"status": "ok", "total": items.len(), "items": items})).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    }
}

async fn get_incident(State(ctx): State<AppContext>, headers: HeaderMap, Path(id): Path<Uuid>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    match incidents::Entity::find_by_id(id).one(&ctx.db).await {
        Ok(Some(model)) => Json(json!({"status": "ok", "item": Incident::from(model)})).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "INCIDENT_NOT_FOUND", format!("no incident {id}")),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateBody {
    status: String,
    resolution_reason: Option<String>,
}

/// Operator-driven transitions only: `OPEN <-> ACK`, and a manual resolve
/// straight to `RESOLVED` with `resolution_reason=manual_resolved`. Every
/// other status is owned by the retry/recompute machinery (C11-C13) and is
/// rejected here.
async fn update_status(State(ctx): State<AppContext>, headers: HeaderMap, Path(id): Path<Uuid>, Json(body): Json<StatusUpdateBody>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }

    let Ok(target) = body.status.parse::<IncidentStatus>() else {
        return error_response_with_field(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", format!("unknown status '{}'", body.status), "status");
    };
    if !matches!(target, IncidentStatus::Open | IncidentStatus::Ack | IncidentStatus::Resolved) {
        return error_response_with_field(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "only OPEN, ACK, or a manual RESOLVED transition may be set by an operator",
            "status",
        );
    }

    let model = match incidents::Entity::find_by_id(id).one(&ctx.db).await {
        Ok(Some(m)) => m,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "INCIDENT_NOT_FOUND", format!("no incident {id}")),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    };

    let now = chrono::Utc::now();
    let mut active: incidents::ActiveModel = model.into();
    active.status = Set(target.as_str().to_string());
    active.updated_at = Set(now);
    if target == IncidentStatus::Resolved {
        active.resolution_reason = Set(Some(ResolutionReason::ManualResolved.as_str().to_string()));
        active.resolved_at = Set(Some(now));
    }

    match active.update(&ctx.db).await {
        Ok(updated) => Json(json!({"status": "ok", "item": Incident::from(updated)})).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    }
}

async fn submit_feedback(State(ctx): State<AppContext>, headers: HeaderMap, Path(id): Path<Uuid>, Json(feedback): Json<IncidentFeedback>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }

    let model = match incidents::Entity::find_by_id(id).one(&ctx.db).await {
        Ok(Some(m)) => m,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "INCIDENT_NOT_FOUND", format!("no incident {id}")),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    };

    let thresholds = Thresholds::default();
    if let Err(e) = validate_feedback(&feedback, &model.status, &thresholds) {
        let code = match e {
            FeedbackValidationError::NotResolved(_) => "INCIDENT_NOT_RESOLVED",
            FeedbackValidationError::InvalidData(_) => "VALIDATION_ERROR",
        };
        return error_response(StatusCode::BAD_REQUEST, code, e.to_string());
    }

    let mut active: incidents::ActiveModel = model.into();
    active.feedback = Set(Some(serde_json::to_value(&feedback).unwrap_or(serde_json::json!(null))));
    active.updated_at = Set(chrono::Utc::now());

    match active.update(&ctx.db).await {
        Ok(updated) => Json(json!({"status": "ok", "feedback": updated.feedback})).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackStatsQuery {
    tenant_id: Option<String>,
}

async fn feedback_stats(State(ctx): State<AppContext>, headers: HeaderMap, Query(q): Query<FeedbackStatsQuery>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    let tenant_id = q.tenant_id.as_deref().unwrap_or("default");

    let resolved_total = match incidents::Entity::find()
        .filter(incidents::Column::TenantId.eq(tenant_id))
        .filter(incidents::Column::Status.eq(IncidentStatus::Resolved.as_str()))
        .count(&ctx.db)
        .await
    {
        Ok(n) => n,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    };

    let with_feedback = match incidents::Entity::find()
        .filter(incidents::Column::TenantId.eq(tenant_id))
        .filter(incidents::Column::Status.eq(IncidentStatus::Resolved.as_str()))
        .filter(incidents::Column::Feedback.is_not_null())
        .all(&ctx.db)
        .await
    {
        Ok(rows) => rows,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", e.to_string()),
    };

    let pairs: Vec<(IncidentFeedback, &'static str)> = with_feedback
        .iter()
        .filter_map(|m| {
            let feedback: IncidentFeedback = serde_json::from_value(m.feedback.clone()?).ok()?;
            let action_class = match feedback.action_taken {
                crate::services::metrics_reporter::FeedbackAction::VerifiedOcr => "VERIFY_OCR",
                crate::services::metrics_reporter::FeedbackAction::VerifiedLogic => "VERIFY_INVOICE_LOGIC",
                crate::services::metrics_reporter::FeedbackAction::AcceptedRounding => "ACCEPT_ROUNDING_TOLERANCE",
                crate::services::metrics_reporter::FeedbackAction::Escalated => "ESCALATED",
                crate::services::metrics_reporter::FeedbackAction::NoActionRequired => "NO_ACTION_REQUIRED",
            };
            Some((feedback, action_class))
        })
        .collect();

    let stats = compute_feedback_stats(&pairs, resolved_total);
    Json(json!({"status": "ok", "stats": stats})).into_response()
}
