pub mod admin_auth;
pub mod auth;
pub mod cors;

pub use admin_auth::{admin_auth_middleware, check_admin_auth};
pub use auth::{rate_limit_middleware, security_headers_middleware};
