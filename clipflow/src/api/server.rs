//! HTTP gateway: listener, shared state and the middleware stack.

use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::jwt::JwtService;
use crate::api::routes;
use crate::error::{Error, Result};
use crate::pipeline::{LifecycleManager, WorkflowOrchestrator};

/// Load balancers poll this prefix; it stays out of the request log.
const HEALTH_PREFIX: &str = "/api/health";

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Allow any origin; the review UI is usually served from elsewhere.
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 12580,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    /// Apply `API_BIND_ADDRESS`, `API_PORT` and `API_ENABLE_CORS` over the defaults.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }
        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }
        if let Ok(cors) = std::env::var("API_ENABLE_CORS")
            && let Ok(parsed) = cors.parse::<bool>()
        {
            config.enable_cors = parsed;
        }

        config
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                Error::config(format!(
                    "invalid API address {}:{}: {e}",
                    self.bind_address, self.port
                ))
            })
    }
}

/// Services shared by every handler.
///
/// Handlers answer 503 when a service is missing, which only happens in
/// router-level tests.
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub jwt_service: Option<Arc<JwtService>>,
    pub orchestrator: Option<Arc<WorkflowOrchestrator>>,
    pub lifecycle: Option<Arc<LifecycleManager>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            jwt_service: None,
            orchestrator: None,
            lifecycle: None,
        }
    }

    pub fn with_services(
        jwt_service: Option<Arc<JwtService>>,
        orchestrator: Arc<WorkflowOrchestrator>,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            jwt_service,
            orchestrator: Some(orchestrator),
            lifecycle: Some(lifecycle),
            ..Self::new()
        }
    }

    pub fn with_jwt_service(mut self, jwt_service: Arc<JwtService>) -> Self {
        self.jwt_service = Some(jwt_service);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn is_health_check(req: &Request) -> bool {
    req.uri().path().starts_with(HEALTH_PREFIX)
}

fn request_span(req: &Request) -> Span {
    if is_health_check(req) {
        return Span::none();
    }
    tracing::info_span!(
        "request",
        method = %req.method(),
        uri = %req.uri(),
        version = ?req.version(),
    )
}

fn log_response(res: &Response, latency: Duration, span: &Span) {
    if span.is_disabled() {
        return;
    }
    tracing::info!(
        parent: span,
        status = res.status().as_u16(),
        latency_ms = latency.as_millis() as u64,
        "Request finished"
    );
}

fn log_failure(class: ServerErrorsFailureClass, latency: Duration, span: &Span) {
    if span.is_disabled() {
        return;
    }
    tracing::error!(
        parent: span,
        classification = %class,
        latency_ms = latency.as_millis() as u64,
        "Request failed"
    );
}

/// The gateway: routes from [`routes::create_router`] behind CORS and
/// request tracing.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self::with_state(config, AppState::new())
    }

    pub fn with_state(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Stop serving when `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(())
                .on_response(log_response)
                .on_failure(log_failure),
        )
    }

    /// Serve until the cancel token fires; in-flight requests finish first.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "API server listening");

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down");
            })
            .await?;

        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 12580);
        assert!(config.enable_cors);
    }

    #[test]
    fn test_bad_bind_address_is_a_config_error() {
        let config = ApiServerConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.socket_addr(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_health_checks_get_no_span() {
        let health = axum::http::Request::get("/api/health/live")
            .body(Body::empty())
            .unwrap();
        let job = axum::http::Request::get("/api/jobs")
            .body(Body::empty())
            .unwrap();
        assert!(is_health_check(&health));
        assert!(!is_health_check(&job));
        assert!(request_span(&health).is_disabled());
    }

    #[test]
    fn test_shutdown_cancels_token() {
        let server = ApiServer::new(ApiServerConfig::default());
        let token = server.cancel_token();
        assert!(!token.is_cancelled());
        server.shutdown();
        assert!(token.is_cancelled());
    }
}
