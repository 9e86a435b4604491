//! API middleware.

pub mod jwt_auth;

pub use jwt_auth::{JwtAuthError, extract_claims, require_admin};
