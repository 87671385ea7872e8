use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::{middleware, routing::get, routing::post, Router};
use tower_http::cors::CorsLayer;
use tracing::info;

use ldp_shared::jwks::{JwksConfig, JwksVerifier};
use ldp_shared::middleware::{correlation_id_middleware, request_logging_middleware};

use crate::config::AuthBffConfig;
use crate::error::{AuthError, AuthResult};
use crate::handlers::{login, logout, me, refresh};
use crate::identity::{HttpIdentityProvider, IdentityProvider};

#[derive(Clone)]
pub struct AuthBffState {
    pub config: Arc<AuthBffConfig>,
    pub provider: Arc<dyn IdentityProvider>,
    pub verifier: Arc<JwksVerifier>,
}

pub struct AuthBffServer {
    config: Arc<AuthBffConfig>,
    app: Router,
}

impl AuthBffServer {
    pub fn new(config: AuthBffConfig) -> AuthResult<Self> {
        let provider: Arc<dyn IdentityProvider> =
            Arc::new(HttpIdentityProvider::new(&config.identity_provider)?);
        Self::with_provider(config, provider)
    }

    /// Test seam: swap the identity provider implementation.
    pub fn with_provider(
        config: AuthBffConfig,
        provider: Arc<dyn IdentityProvider>,
    ) -> AuthResult<Self> {
        let config = Arc::new(config);

        let verifier = JwksVerifier::new(JwksConfig {
            jwks_url: config.jwks.url.clone(),
            issuer: config.jwks.issuer.clone(),
            refresh_interval: Duration::from_secs(config.jwks.refresh_interval_seconds),
            fetch_timeout: Duration::from_secs(config.jwks.fetch_timeout_seconds),
        })
        .map_err(|e| AuthError::Internal(e.to_string()))?;

        let state = AuthBffState {
            config: config.clone(),
            provider,
            verifier,
        };

        let app = Self::build_router(state)?;
        Ok(Self { config, app })
    }

    fn build_router(state: AuthBffState) -> AuthResult<Router> {
        // Credentials require an exact origin; a wildcard would break the
        // cookie contract.
        let origin: HeaderValue = state
            .config
            .cors
            .frontend_origin
            .parse()
            .map_err(|_| AuthError::Internal("invalid frontend origin".to_string()))?;

        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
            .allow_credentials(true);

        Ok(Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/auth/me", get(me))
            .route("/health", get(|| async { "OK" }))
            .with_state(state)
            .layer(cors)
            .layer(middleware::from_fn(request_logging_middleware))
            .layer(middleware::from_fn(correlation_id_middleware)))
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> AuthResult<()> {
        let addr = self.config.server.bind_addr();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::Internal(format!("bind {}: {}", addr, e)))?;

        info!(addr = %addr, "Auth BFF listening");

        axum::serve(listener, self.app)
            .await
            .map_err(|e| AuthError::Internal(format!("server: {}", e)))?;

        Ok(())
    }
}
