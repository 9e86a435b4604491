//! API route modules.

pub mod health;
pub mod jobs;

use axum::{Json, Router, middleware, routing::get};
use utoipa::OpenApi;

use crate::api::middleware::require_admin;
use crate::api::openapi::ApiDoc;
use crate::api::server::AppState;

/// Create the main API router with all routes.
///
/// Job routes require an admin token; health and the OpenAPI document do not.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/api/jobs", jobs::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(protected)
        .nest("/api/health", health::router())
        .route(
            "/api/docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .with_state(state)
}
