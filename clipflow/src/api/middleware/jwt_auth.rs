//! Bearer token authentication for job endpoints.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::error::ApiError;
use crate::api::jwt::{ADMIN_ROLE, Claims, JwtError};
use crate::api::server::AppState;

#[derive(Debug)]
pub enum JwtAuthError {
    MissingToken,
    /// Not a `Bearer` credential
    InvalidFormat,
    InvalidToken(JwtError),
    MissingRole,
    NotConfigured,
}

impl IntoResponse for JwtAuthError {
    fn into_response(self) -> Response {
        let err = match self {
            JwtAuthError::MissingToken => ApiError::unauthorized("Missing authorization token"),
            JwtAuthError::InvalidFormat => ApiError::unauthorized("Invalid token format"),
            JwtAuthError::InvalidToken(JwtError::TokenExpired) => {
                ApiError::unauthorized("Token has expired")
            }
            JwtAuthError::InvalidToken(_) => ApiError::unauthorized("Invalid token"),
            JwtAuthError::MissingRole => {
                ApiError::forbidden(format!("The '{ADMIN_ROLE}' role is required"))
            }
            JwtAuthError::NotConfigured => {
                ApiError::service_unavailable("Authentication is not configured")
            }
        };
        err.into_response()
    }
}

/// Extract Bearer token from Authorization header.
fn extract_bearer_token(request: &Request) -> Result<&str, JwtAuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or(JwtAuthError::MissingToken)?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| JwtAuthError::InvalidFormat)?;

    auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(JwtAuthError::InvalidFormat)
}

/// Require a valid token carrying the admin role.
///
/// The validated claims are inserted into the request extensions.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, JwtAuthError> {
    let jwt_service = state
        .jwt_service
        .as_ref()
        .ok_or(JwtAuthError::NotConfigured)?;

    let token = extract_bearer_token(&request)?;
    let claims = jwt_service
        .validate_token(token)
        .map_err(JwtAuthError::InvalidToken)?;

    if !claims.is_admin() {
        tracing::warn!(sub = %claims.sub, "Rejected request without admin role");
        return Err(JwtAuthError::MissingRole);
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Claims of the authenticated operator, if the request passed [`require_admin`].
pub fn extract_claims(request: &Request) -> Option<&Claims> {
    request.extensions().get::<Claims>()
}
