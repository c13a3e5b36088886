//! C1/C14 ambient surface: the readiness probe load balancers and
//! deploy tooling poll, an unauthenticated Prometheus-format scrape
//! endpoint, and a static version/build banner.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use loco_rs::app::AppContext;
use loco_rs::prelude::*;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use serde_json::json;

use crate::config::{AdminConfig, Thresholds};
use crate::services::config_validation_service::ConfigValidationService;
use crate::services::metrics_reporter::{render_prometheus_text, MetricsReporter};

pub fn routes() -> Routes {
    Routes::new()
        .prefix("system")
        .add("/health", get(health))
        .add("/metrics", get(metrics))
        .add("/version", get(version))
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
}

fn pass(name: &'static str, detail: impl Into<String>) -> CheckResult {
    CheckResult { name, status: "ok", detail: detail.into() }
}
fn warn(name: &'static str, detail: impl Into<String>) -> CheckResult {
    CheckResult { name, status: "warning", detail: detail.into() }
}
fn fail(name: &'static str, detail: impl Into<String>) -> CheckResult {
    CheckResult { name, status: "error", detail: detail.into() }
}

/// Readiness probe (§6). Returns 200 when every critical check passes,
/// 503 with the full report otherwise — a warning alone never fails the
/// probe, only an `error` does.
async fn health(State(ctx): State<AppContext>) -> Response {
    let thresholds = Thresholds::default();
    let admin = AdminConfig::from_env();
    let mut checks = Vec::new();

    let config_result = ConfigValidationService::new(&thresholds, &admin).validate();
    checks.push(if config_result.valid {
        pass("config_invariants", "all I1-I8 invariants satisfied")
    } else {
        fail("config_invariants", config_result.errors.join("; "))
    });

    let db_start = std::time::Instant::now();
    let db_check = match ctx.db.execute_unprepared("SELECT 1").await {
        Ok(_) => {
            let elapsed_ms = db_start.elapsed().as_millis();
            if elapsed_ms > 500 {
                fail("data_store", format!("query took {elapsed_ms}ms (>500ms threshold)"))
            } else if elapsed_ms > 100 {
                warn("data_store", format!("query took {elapsed_ms}ms (>100ms threshold)"))
            } else {
                pass("data_store", format!("query took {elapsed_ms}ms"))
            }
        }
        Err(e) => fail("data_store", format!("connectivity check failed: {e}")),
    };
    checks.push(db_check);

    checks.push(match std::env::var("EXTRACTION_API_KEY") {
        Ok(v) if !v.is_empty() => pass("extraction_api_credential", "EXTRACTION_API_KEY present"),
        _ => fail("extraction_api_credential", "EXTRACTION_API_KEY is not set"),
    });

    let reporter = MetricsReporter::new(&ctx.db, &thresholds);
    let now = chrono::Utc::now();
    match reporter.queue_depth("default").await {
        Ok(depth) => checks.push(pass("queue_depth", format!("{depth} incidents pending retry or recompute"))),
        Err(e) => checks.push(fail("queue_depth", e.to_string())),
    }
    match reporter.stuck_pending_recompute_count("default", now).await {
        Ok(0) => checks.push(pass("stuck_jobs", "no PENDING_RECOMPUTE incident stuck past the 10 minute threshold")),
        Ok(n) => checks.push(fail("stuck_jobs", format!("{n} incident(s) stuck in PENDING_RECOMPUTE past the 10 minute threshold"))),
        Err(e) => checks.push(fail("stuck_jobs", e.to_string())),
    }

    let build_id = std::env::var("BUILD_ID")
        .or_else(|_| std::env::var("GIT_COMMIT_SHA"))
        .map(|s| s.chars().take(12).collect::<String>())
        .unwrap_or_else(|_| "unknown".to_string());

    let overall_ok = checks.iter().all(|c| c.status != "error");
    let status_code = if overall_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let body = json!({
        "status": if overall_ok { "ok" } else { "error" },
        "build_id": build_id,
        "config_hash": thresholds.config_hash(),
        "checks": checks,
    });

    (status_code, Json(body)).into_response()
}

/// Prometheus text exposition, unauthenticated, scoped to this process's
/// own instance-local counters (no cross-instance aggregation).
async fn metrics(State(ctx): State<AppContext>) -> Response {
    let thresholds = Thresholds::default();
    let reporter = MetricsReporter::new(&ctx.db, &thresholds);
    let now = chrono::Utc::now();
    let since = (now - chrono::Duration::days(30)).date_naive();
    let until = now.date_naive();

    match reporter.run_summary("default", since, until, now).await {
        Ok(summary) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render_prometheus_text(&summary),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
