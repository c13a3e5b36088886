//! C5 admin surface: kill-switch introspection/toggling and the combined
//! ops status snapshot (config hash + schema version + switch summary).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use loco_rs::app::AppContext;
use loco_rs::prelude::*;
use serde::Deserialize;
use serde_json::json;

use crate::config::Thresholds;
use crate::controllers::support::{admin_guard, error_response};
use crate::guards::kill_switch;

const CONFIG_SCHEMA_VERSION: u32 = 1;

pub fn routes() -> Routes {
    Routes::new()
        .prefix("admin/ops")
        .add("/kill-switches", get(list_switches))
        .add("/kill-switches/:name", put(set_switch))
        .add("/status", get(status))
}

async fn list_switches(_ctx: State<AppContext>, headers: HeaderMap) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    let switches = kill_switch::global().list();
    Json(json!({"status": "ok", "items": switches})).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SetSwitchBody {
    enabled: bool,
    actor: String,
    reason: Option<String>,
}

async fn set_switch(_ctx: State<AppContext>, headers: HeaderMap, Path(name): Path<String>, Json(body): Json<SetSwitchBody>) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    if body.actor.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "actor is required to toggle a kill-switch");
    }
    let status = kill_switch::global().set(&name, body.enabled, &body.actor, body.reason);
    Json(json!({"status": "ok", "item": status})).into_response()
}

async fn status(_ctx: State<AppContext>, headers: HeaderMap) -> Response {
    if let Err(resp) = admin_guard(&headers) {
        return resp;
    }
    let thresholds = Thresholds::default();
    let switches = kill_switch::global().list();
    let tripped = switches.iter().filter(|s| s.enabled).count();

    Json(json!({
        "status": "ok",
        "config_hash": thresholds.config_hash(),
        "config_schema_version": CONFIG_SCHEMA_VERSION,
        "kill_switches": {
            "total": switches.len(),
            "tripped": tripped,
            "items": switches,
        },
    }))
    .into_response()
}
