use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ldp_shared::config::{HttpServerConfig, LoggingConfig, RedisConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server: HttpServerConfig,
    pub logging: LoggingConfig,
    pub redis: RedisConfig,
    pub cors: CorsConfig,
    pub jwks: JwksSettings,
    pub tenant_authority: TenantAuthorityConfig,
    pub rate_limiting: RateLimitingConfig,
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksSettings {
    pub url: String,
    pub issuer: String,
    pub refresh_interval_seconds: u64,
    pub fetch_timeout_seconds: u64,
}

impl JwksSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantAuthorityConfig {
    pub base_url: String,
    pub timeout_millis: u64,
    pub cache_ttl_seconds: u64,
    pub failure_threshold: u32,
    pub open_cooldown_seconds: u64,
}

impl TenantAuthorityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn open_cooldown(&self) -> Duration {
        Duration::from_secs(self.open_cooldown_seconds)
    }
}

/// Token-bucket parameters: `replenish_rate` tokens per second refill,
/// `burst_capacity` bucket size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub replenish_rate: u32,
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub default_policy: RateLimitPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub path_prefix: String,
    pub upstream: String,
    pub strip_prefix: usize,
    pub timeout_seconds: u64,
    pub rate_limit: Option<RateLimitPolicy>,
}

impl RouteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl GatewayConfig {
    /// Development defaults, overridden by an optional `gateway` config file
    /// and `GATEWAY__`-prefixed environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = config::Config::try_from(&Self::development())
            .context("Failed to seed gateway configuration defaults")?;

        let cfg = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("gateway").required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build gateway configuration")?;

        cfg.try_deserialize()
            .context("Failed to deserialize gateway configuration")
    }

    pub fn development() -> Self {
        Self {
            server: HttpServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout_seconds: 30,
            },
            logging: LoggingConfig::default(),
            redis: RedisConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec!["http://localhost:5173".to_string()],
            },
            jwks: JwksSettings {
                url: "http://localhost:8090/realms/ldp/protocol/openid-connect/certs".to_string(),
                issuer: "http://localhost:8090/realms/ldp".to_string(),
                refresh_interval_seconds: 300,
                fetch_timeout_seconds: 5,
            },
            tenant_authority: TenantAuthorityConfig {
                base_url: "http://localhost:8085".to_string(),
                timeout_millis: 2000,
                cache_ttl_seconds: 10,
                failure_threshold: 5,
                open_cooldown_seconds: 15,
            },
            rate_limiting: RateLimitingConfig {
                enabled: true,
                default_policy: RateLimitPolicy {
                    replenish_rate: 50,
                    burst_capacity: 100,
                },
            },
            routes: vec![
                RouteConfig {
                    path_prefix: "/auth".to_string(),
                    upstream: "http://localhost:8081".to_string(),
                    strip_prefix: 0,
                    timeout_seconds: 10,
                    rate_limit: Some(RateLimitPolicy {
                        replenish_rate: 5,
                        burst_capacity: 10,
                    }),
                },
                RouteConfig {
                    path_prefix: "/api/tenants".to_string(),
                    upstream: "http://localhost:8085".to_string(),
                    strip_prefix: 1,
                    timeout_seconds: 30,
                    rate_limit: None,
                },
                RouteConfig {
                    path_prefix: "/api".to_string(),
                    upstream: "http://localhost:8082".to_string(),
                    strip_prefix: 1,
                    timeout_seconds: 30,
                    rate_limit: None,
                },
            ],
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// Paths that bypass authentication and tenant checks. They still take rate
/// limiting (keyed by source address) and a correlation id.
pub fn is_public_path(path: &str) -> bool {
    matches!(path, "/health" | "/metrics")
        || path == "/auth/login"
        || path == "/auth/refresh"
}
