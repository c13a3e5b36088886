//! Ambient hardening carried unchanged from the teacher regardless of the
//! domain change: these apply to every response, admin or not.

use axum::{extract::Request, middleware::Next, response::Response};
use loco_rs::prelude::*;

/// Placeholder for a future per-IP/per-tenant limiter; currently a no-op
/// pass-through. Pilot-tenant admission is already rate-limited by
/// [`crate::guards::PilotGuard`], which is the one that actually matters
/// today.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Result<Response> {
    Ok(next.run(request).await)
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("X-XSS-Protection", "1; mode=block".parse().unwrap());
    headers.insert("Referrer-Policy", "strict-origin-when-cross-origin".parse().unwrap());
    headers.insert(
        "Content-Security-Policy",
        "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'"
            .parse()
            .unwrap(),
    );
    headers.insert("Strict-Transport-Security", "max-age=31536000; includeSubDomains".parse().unwrap());

    response
}
