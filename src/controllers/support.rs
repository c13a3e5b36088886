//! Shared admin-surface plumbing: the uniform error envelope (§6) and the
//! bearer-auth guard every admin handler runs through before touching the
//! store.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::config::AdminConfig;
use crate::guards::kill_switch;
use crate::middleware::admin_auth::check_admin_auth;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn error_response(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            status: "error",
            error_code: error_code.into(),
            message: message.into(),
            field: None,
            row_index: None,
            details: None,
        }),
    )
        .into_response()
}

pub fn error_response_with_field(
    status: StatusCode,
    error_code: impl Into<String>,
    message: impl Into<String>,
    field: impl Into<String>,
) -> Response {
    (
        status,
        Json(ErrorBody {
            status: "error",
            error_code: error_code.into(),
            message: message.into(),
            field: Some(field.into()),
            row_index: None,
            details: None,
        }),
    )
        .into_response()
}

/// Disabled entirely in development; otherwise requires a matching bearer
/// token. Constructed fresh per request since the admin plane has no
/// request-scoped session to cache it on.
pub fn admin_guard(headers: &HeaderMap) -> Result<(), Response> {
    let admin = AdminConfig::from_env();
    check_admin_auth(headers, &admin).map_err(|e| error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()))
}

/// Head-of-pipeline kill-switch check for a protected call-class, ahead of
/// the wrapper stack. A tripped switch short-circuits with a structured
/// deny rather than reaching the store or an outbound dependency.
pub fn kill_switch_guard(call_class: &str) -> Result<(), Response> {
    kill_switch::global().check(call_class).map_err(|e| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "CALL_CLASS_DISABLED",
            e.to_string(),
        )
    })
}
