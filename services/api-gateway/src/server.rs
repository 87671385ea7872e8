use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use ldp_shared::jwks::{JwksConfig, JwksVerifier};
use ldp_shared::middleware::{correlation_id_middleware, request_logging_middleware};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{health_handler, metrics_handler};
use crate::metrics::{metrics_middleware, GatewayMetrics};
use crate::middleware::{auth_middleware, cors_middleware, rate_limit_middleware};
use crate::proxy::proxy_handler;
use crate::rate_limiter::RateLimiter;
use crate::routing::RouteTable;
use crate::tenant_authority::TenantAuthorityClient;

#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<JwksVerifier>,
    pub tenant_authority: Arc<TenantAuthorityClient>,
    pub rate_limiter: Arc<RateLimiter>,
    pub routes: Arc<RouteTable>,
    pub http_client: reqwest::Client,
    pub metrics: Arc<GatewayMetrics>,
}

pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    app: Router,
}

impl GatewayServer {
    pub async fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let config = Arc::new(config);

        info!("Initializing API gateway components");

        let verifier = JwksVerifier::new(JwksConfig {
            jwks_url: config.jwks.url.clone(),
            issuer: config.jwks.issuer.clone(),
            refresh_interval: config.jwks.refresh_interval(),
            fetch_timeout: config.jwks.fetch_timeout(),
        })
        .map_err(GatewayError::from)?;

        let tenant_authority = Arc::new(
            TenantAuthorityClient::new(&config.tenant_authority).map_err(GatewayError::from)?,
        );

        let rate_limiter = Arc::new(
            RateLimiter::new(&config.redis.url, config.rate_limiting.clone())
                .await
                .map_err(GatewayError::from)?,
        );

        let routes = Arc::new(RouteTable::new(config.routes.clone()));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.request_timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Internal {
                message: format!("http client: {}", e),
            })?;

        let metrics = Arc::new(GatewayMetrics::new().map_err(|e| GatewayError::Internal {
            message: format!("metrics registry: {}", e),
        })?);

        let state = GatewayState {
            config: config.clone(),
            verifier,
            tenant_authority,
            rate_limiter,
            routes,
            http_client,
            metrics,
        };

        let app = Self::build_router(state);

        info!("API gateway initialized");
        Ok(Self { config, app })
    }

    /// Layering runs outermost-last-added: trace/timeout and metrics wrap
    /// everything, then correlation id and request logging, then CORS,
    /// authentication, and rate limiting in pipeline order before the proxy
    /// fallback.
    pub fn build_router(state: GatewayState) -> Router {
        let request_timeout = state.config.server.request_timeout();

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(proxy_handler)
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
            .layer(middleware::from_fn(request_logging_middleware))
            .layer(middleware::from_fn(correlation_id_middleware))
            .layer(middleware::from_fn_with_state(state, metrics_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> GatewayResult<()> {
        let addr = self.config.server.bind_addr();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| GatewayError::Internal {
                message: format!("bind {}: {}", addr, e),
            })?;

        info!(addr = %addr, "API gateway listening");

        axum::serve(listener, self.app)
            .await
            .map_err(|e| GatewayError::Internal {
                message: format!("server: {}", e),
            })?;

        Ok(())
    }
}
