use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ldp_shared::config::{DatabaseConfig, HttpServerConfig, LoggingConfig, RedisConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantServiceConfig {
    pub server: HttpServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Consumer group for this service's schema-provisioning listener.
    pub consumer_group: String,
    pub outbox_poll_interval_millis: u64,
}

impl EventsConfig {
    pub fn outbox_poll_interval(&self) -> Duration {
        Duration::from_millis(self.outbox_poll_interval_millis)
    }
}

impl TenantServiceConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = config::Config::try_from(&Self::development())
            .context("Failed to seed tenant service configuration defaults")?;

        let cfg = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("tenant-service").required(false))
            .add_source(
                config::Environment::with_prefix("TENANT_SERVICE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build tenant service configuration")?;

        cfg.try_deserialize()
            .context("Failed to deserialize tenant service configuration")
    }

    pub fn development() -> Self {
        Self {
            server: HttpServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8085,
                request_timeout_seconds: 30,
            },
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            events: EventsConfig {
                consumer_group: "tenant-service".to_string(),
                outbox_poll_interval_millis: 500,
            },
        }
    }
}

impl Default for TenantServiceConfig {
    fn default() -> Self {
        Self::development()
    }
}
