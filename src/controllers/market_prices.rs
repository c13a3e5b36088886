//! C7/C8 admin HTTP surface: upsert/list/history/lock and CSV|JSON bulk
//! import over the market-price store. Every handler runs the bearer-auth
//! guard first and renders the uniform error envelope on failure.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use loco_rs::app::AppContext;
use loco_rs::prelude::*;
use serde::Deserialize;
use serde_json::json;

use crate::controllers::support::{admin_guard, error_response, error_response_with_field, kill_switch_guard};
use crate::services::bulk_importer::{parse_csv, parse_json, ImportRow, ParseError};
use crate::services::market_price_admin_service::{
    ListPricesQuery, MarketPriceAdminService, ServiceError, ServiceErrorCode, SortBy, UpsertInput,
};
use crate::services::market_price_validator::{validate_entry, RawMarketPriceInput};

const DEFAULT_PRICE_TYPE: &str = "PTF";

pub fn routes() -> Routes {
    Routes::new()
        .prefix("admin/market-prices")
        .add("/", get(list_prices))
        .add("/", post(upsert_price))
        .add("/history", get(history))
        .add("/import/preview", post(import_preview))
        .add("/import/apply", post(import_apply))
        .add("/:period/lock", post(lock))
        .add("/:period/unlock", post(unlock))
        .add("/:period", get(get_one))
}

fn service_error_status(code: ServiceErrorCode) -> StatusCode {
    match code {
        ServiceErrorCode::ChangeReasonRequired => StatusCode::BAD_REQUEST,
        ServiceErrorCode::FuturePeriod => StatusCode::BAD_REQUEST,
        ServiceErrorCode::PeriodNotFound => StatusCode::NOT_FOUND,
        ServiceErrorCode::PeriodLocked
        | ServiceErrorCode::FinalRecordProtected
        | ServiceErrorCode::StatusDowngradeForbidden => StatusCode::CONFLICT,
        ServiceErrorCode::DbConflict | ServiceErrorCode::DbWriteFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn service_error_response(e: ServiceError) -> Response {
    error_response(service_error_status(e.code), format!("{:?}", e.code), e.message)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    price_type: Option<String>,
    status: Option<String>,
    from_period: Option<String>,
    to_period: Option<String>,
    sort: Option<String>,
    order: Option<String>,
    page: Option<u64>,
    page_size: Option<u64>,
}

async fn list_prices(State(ctx): State<AppContext>, headers: HeaderMap, Query(q): Query<ListQuery>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }

    let sort_by = match q.sort.as_deref() {
        None => SortBy::Period,
        Some(raw) => match SortBy::parse(raw) {
            Some(s) => s,
            None => return error_response_with_field(StatusCode::BAD_REQUEST, "INVALID_SORT_FIELD", format!("unknown sort field '{raw}'"), "sort"),
        },
    };
    let descending = match q.order.as_deref() {
        None | Some("desc") => true,
        Some("asc") => false,
        Some(other) => {
            return error_response_with_field(StatusCode::BAD_REQUEST, "INVALID_SORT_ORDER", format!("unknown sort order '{other}'"), "order")
        }
    };

    let page = q.page.unwrap_or(1).max(1) - 1;
    let page_size = q.page_size.unwrap_or(50).clamp(1, 100);

    let query = ListPricesQuery {
        price_type: q.price_type,
        status: q.status,
        from_period: q.from_period,
        to_period: q.to_period,
        sort_by,
        descending,
        page,
        page_size,
    };

    let service = MarketPriceAdminService::new(&ctx.db);
    match service.list_prices(query).await {
        Ok(result) => Json(json!({
            "status": "ok",
            "total": result.total,
            "page": result.page + 1,
            "page_size": result.page_size,
            "items": result.records,
        }))
        .into_response(),
        Err(e) => service_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PeriodTypeQuery {
    price_type: Option<String>,
}

async fn get_one(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(period): Path<String>,
    Query(q): Query<PeriodTypeQuery>,
) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    let price_type = q.price_type.as_deref().unwrap_or(DEFAULT_PRICE_TYPE);
    let service = MarketPriceAdminService::new(&ctx.db);
    match service.get_by_key(price_type, &period).await {
        Ok(Some(record)) => Json(json!({"status": "ok", "item": record})).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "PERIOD_NOT_FOUND", format!("no price for {price_type} {period}")),
        Err(e) => service_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertBody {
    period: String,
    value: String,
    price_type: Option<String>,
    status: Option<String>,
    source_note: Option<String>,
    change_reason: Option<String>,
    force_update: Option<bool>,
}

async fn upsert_price(State(ctx): State<AppContext>, headers: HeaderMap, Json(body): Json<UpsertBody>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    if let Err(resp) = kill_switch_guard("market_price_upsert") {
        return resp;
    }

    let price_type = body.price_type.unwrap_or_else(|| DEFAULT_PRICE_TYPE.to_string());
    let status = body.status.unwrap_or_else(|| "provisional".to_string());
    let (validation, normalized) = validate_entry(RawMarketPriceInput {
        period: &body.period,
        value: &body.value,
        status: &status,
        price_type: &price_type,
    });
    if !validation.is_valid() {
        let first = &validation.errors[0];
        return error_response_with_field(StatusCode::BAD_REQUEST, format!("{:?}", first.code), first.message.clone(), first.field.clone());
    }
    let normalized = normalized.expect("validated input carries a normalized form");

    let input = UpsertInput {
        price_type: normalized.price_type,
        period: normalized.period,
        value: normalized.value,
        status: normalized.status,
        source: body.source_note.unwrap_or_else(|| "admin_manual".to_string()),
        change_reason: body.change_reason,
        updated_by: "admin".to_string(),
        force_update: body.force_update.unwrap_or(false),
    };

    let service = MarketPriceAdminService::new(&ctx.db);
    match service.upsert_price(input).await {
        Ok(result) => Json(json!({
            "status": "ok",
            "action": if result.created { "created" } else { "updated" },
            "period": result.record.period,
            "warnings": Vec::<String>::new(),
        }))
        .into_response(),
        Err(e) => service_error_response(e),
    }
}

async fn history(State(ctx): State<AppContext>, headers: HeaderMap, Query(q): Query<HistoryQuery>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    let price_type = q.price_type.as_deref().unwrap_or(DEFAULT_PRICE_TYPE);
    let Some(period) = q.period.as_deref() else {
        return error_response_with_field(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "period query parameter is required", "period");
    };
    let service = MarketPriceAdminService::new(&ctx.db);
    match service.get_history(price_type, period).await {
        Ok(Some(rows)) => Json(json!({"status": "ok", "period": period, "price_type": price_type, "history": rows})).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "PERIOD_NOT_FOUND", format!("no price for {price_type} {period}")),
        Err(e) => service_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    period: Option<String>,
    price_type: Option<String>,
}

async fn lock(State(ctx): State<AppContext>, headers: HeaderMap, Path(period): Path<String>, Query(q): Query<PeriodTypeQuery>) -> Response {
    toggle_lock(ctx, headers, period, q, true).await
}

async fn unlock(State(ctx): State<AppContext>, headers: HeaderMap, Path(period): Path<String>, Query(q): Query<PeriodTypeQuery>) -> Response {
    toggle_lock(ctx, headers, period, q, false).await
}

async fn toggle_lock(ctx: AppContext, headers: HeaderMap, period: String, q: PeriodTypeQuery, locked: bool) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    let price_type = q.price_type.as_deref().unwrap_or(DEFAULT_PRICE_TYPE);
    let service = MarketPriceAdminService::new(&ctx.db);
    match service.set_locked(price_type, &period, locked).await {
        Ok(_) => Json(json!({"status": "ok", "message": if locked { "locked" } else { "unlocked" }})).into_response(),
        Err(e) => service_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ImportFields {
    price_type: String,
    force_update: bool,
    strict_mode: bool,
    content: String,
    is_json: bool,
}

async fn read_import_multipart(mut multipart: Multipart) -> Result<ImportFields, Response> {
    let mut price_type = DEFAULT_PRICE_TYPE.to_string();
    let mut force_update = false;
    let mut strict_mode = false;
    let mut content: Option<String> = None;
    let mut is_json = false;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, "INVALID_JSON", e.to_string()))?;
        let Some(field) = field else { break };
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "price_type" => {
                price_type = field.text().await.unwrap_or_default();
            }
            "force_update" => {
                force_update = field.text().await.unwrap_or_default() == "true";
            }
            "strict_mode" => {
                strict_mode = field.text().await.unwrap_or_default() == "true";
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_lowercase();
                is_json = file_name.ends_with(".json");
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| error_response(StatusCode::BAD_REQUEST, "PARSE_ERROR", e.to_string()))?;
                content = Some(String::from_utf8_lossy(&bytes).to_string());
            }
            _ => {}
        }
    }

    let content = content.ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "EMPTY_FILE", "no file field in multipart body"))?;
    Ok(ImportFields { price_type, force_update, strict_mode, content, is_json })
}

fn parse_rows(fields: &ImportFields) -> Result<Vec<ImportRow>, Response> {
    let result = if fields.is_json { parse_json(&fields.content) } else { parse_csv(&fields.content) };
    result.map_err(|e| match e {
        ParseError::Empty(msg) => error_response(StatusCode::BAD_REQUEST, "EMPTY_FILE", msg),
        ParseError::Csv(msg) | ParseError::Json(msg) => error_response(StatusCode::BAD_REQUEST, "PARSE_ERROR", msg),
        ParseError::MissingColumn(col) => error_response_with_field(StatusCode::BAD_REQUEST, "PARSE_ERROR", format!("missing required column '{col}'"), col),
    })
}

async fn import_preview(State(ctx): State<AppContext>, headers: HeaderMap, multipart: Multipart) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    let fields = match read_import_multipart(multipart).await {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let rows = match parse_rows(&fields) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let service = MarketPriceAdminService::new(&ctx.db);
    match service.preview_bulk_import(&rows, &fields.price_type, fields.force_update).await {
        Ok(preview) => Json(json!({"status": "ok", "preview": preview})).into_response(),
        Err(e) => service_error_response(e),
    }
}

async fn import_apply(State(ctx): State<AppContext>, headers: HeaderMap, multipart: Multipart) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    if let Err(resp) = kill_switch_guard("market_price_import") {
        return resp;
    }
    let fields = match read_import_multipart(multipart).await {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let rows = match parse_rows(&fields) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let service = MarketPriceAdminService::new(&ctx.db);
    match service
        .apply_bulk_import(rows, "admin", &fields.price_type, fields.force_update, fields.strict_mode, "bulk_import", Some("Bulk import"))
        .await
    {
        Ok(result) => Json(json!({"status": "ok", "result": result})).into_response(),
        Err(e) => service_error_response(e),
    }
}
