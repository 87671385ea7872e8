// Health checking shared by all services

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[async_trait::async_trait]
pub trait HealthCheckProvider: Send + Sync {
    async fn check(&self) -> HealthCheck;
    fn name(&self) -> &str;
}

pub struct HealthChecker {
    checks: Vec<Box<dyn HealthCheckProvider>>,
    version: String,
}

impl HealthChecker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            checks: Vec::new(),
            version: version.into(),
        }
    }

    pub fn add_check<T: HealthCheckProvider + 'static>(mut self, check: T) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut checks = HashMap::new();
        let mut overall = "healthy";

        for provider in &self.checks {
            let check = provider.check().await;
            if check.status != "healthy" {
                overall = "unhealthy";
            }
            checks.insert(provider.name().to_string(), check);
        }

        HealthStatus {
            status: overall.to_string(),
            timestamp: Utc::now(),
            version: self.version.clone(),
            checks,
        }
    }
}

pub struct DatabaseHealthCheck {
    pool: sqlx::PgPool,
}

impl DatabaseHealthCheck {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HealthCheckProvider for DatabaseHealthCheck {
    async fn check(&self) -> HealthCheck {
        let start = Instant::now();
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => HealthCheck {
                status: "healthy".to_string(),
                message: None,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => HealthCheck {
                status: "unhealthy".to_string(),
                message: Some(format!("database: {}", e)),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }

    fn name(&self) -> &str {
        "database"
    }
}

pub struct RedisHealthCheck {
    client: redis::Client,
}

impl RedisHealthCheck {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HealthCheckProvider for RedisHealthCheck {
    async fn check(&self) -> HealthCheck {
        let start = Instant::now();
        let result = async {
            let mut conn = self.client.get_async_connection().await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        }
        .await;

        match result {
            Ok(_) => HealthCheck {
                status: "healthy".to_string(),
                message: None,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => HealthCheck {
                status: "unhealthy".to_string(),
                message: Some(format!("redis: {}", e)),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }

    fn name(&self) -> &str {
        "redis"
    }
}
