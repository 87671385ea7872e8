use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ldp_shared::config::{HttpServerConfig, LoggingConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthBffConfig {
    pub server: HttpServerConfig,
    pub logging: LoggingConfig,
    pub identity_provider: IdentityProviderConfig,
    pub cookie: CookieConfig,
    pub cors: CorsSettings,
    pub jwks: JwksSettings,
    /// Transitional: accept the refresh token in the request body as well as
    /// the cookie. Versioned decision, default off; remove with the next
    /// API version.
    pub allow_body_refresh_token: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl IdentityProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    /// Disabled only in local development over plain HTTP.
    pub secure: bool,
    pub max_age_seconds: i64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "refreshToken".to_string(),
            path: "/auth".to_string(),
            domain: None,
            secure: true,
            max_age_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsSettings {
    pub frontend_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksSettings {
    pub url: String,
    pub issuer: String,
    pub refresh_interval_seconds: u64,
    pub fetch_timeout_seconds: u64,
}

impl AuthBffConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = config::Config::try_from(&Self::development())
            .context("Failed to seed auth BFF configuration defaults")?;

        let cfg = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("auth-bff").required(false))
            .add_source(
                config::Environment::with_prefix("AUTH_BFF")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build auth BFF configuration")?;

        cfg.try_deserialize()
            .context("Failed to deserialize auth BFF configuration")
    }

    pub fn development() -> Self {
        Self {
            server: HttpServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
                request_timeout_seconds: 15,
            },
            logging: LoggingConfig::default(),
            identity_provider: IdentityProviderConfig {
                base_url: "http://localhost:8090".to_string(),
                timeout_seconds: 10,
            },
            cookie: CookieConfig {
                secure: false,
                ..CookieConfig::default()
            },
            cors: CorsSettings {
                frontend_origin: "http://localhost:5173".to_string(),
            },
            jwks: JwksSettings {
                url: "http://localhost:8090/realms/ldp/protocol/openid-connect/certs".to_string(),
                issuer: "http://localhost:8090/realms/ldp".to_string(),
                refresh_interval_seconds: 300,
                fetch_timeout_seconds: 5,
            },
            allow_body_refresh_token: false,
        }
    }
}

impl Default for AuthBffConfig {
    fn default() -> Self {
        Self::development()
    }
}
