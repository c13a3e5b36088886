//! Admin HTTP surface authentication: a single shared operator credential
//! compared against a static bearer token, generalized from the teacher's
//! per-user JWT scheme since the admin plane here has one operator role,
//! not a session hierarchy.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use loco_rs::prelude::*;

use crate::config::AdminConfig;

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ")
}

/// Disabled entirely in development (per `AdminConfig::enabled`); otherwise
/// the bearer token must match `admin_key` exactly.
pub fn check_admin_auth(headers: &HeaderMap, admin: &AdminConfig) -> Result<()> {
    if !admin.enabled {
        return Ok(());
    }
    let token = extract_bearer(headers)
        .ok_or_else(|| Error::Unauthorized("missing or malformed Authorization header".to_string()))?;
    if token != admin.admin_key || admin.admin_key.is_empty() {
        return Err(Error::Unauthorized("invalid admin credentials".to_string()));
    }
    Ok(())
}

/// Router-layer form of [`check_admin_auth`], kept alongside the plain
/// function for call sites that can attach a tower layer instead of
/// checking inline.
pub async fn admin_auth_middleware(
    State(admin): State<AdminConfig>,
    request: Request,
    next: Next,
) -> Result<Response> {
    check_admin_auth(request.headers(), &admin)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn admin(enabled: bool, key: &str) -> AdminConfig {
        AdminConfig {
            enabled,
            admin_key: key.to_string(),
            environment: "production".to_string(),
        }
    }

    #[test]
    fn disabled_admin_surface_allows_any_request() {
        let headers = HeaderMap::new();
        assert!(check_admin_auth(&headers, &admin(false, "")).is_ok());
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(check_admin_auth(&headers, &admin(true, "a-real-admin-key")).is_err());
    }

    #[test]
    fn matching_bearer_token_is_authorized() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer a-real-admin-key"));
        assert!(check_admin_auth(&headers, &admin(true, "a-real-admin-key")).is_ok());
    }

    #[test]
    fn mismatched_bearer_token_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong-key"));
        assert!(check_admin_auth(&headers, &admin(true, "a-real-admin-key")).is_err());
    }
}
