// Gateway-local handlers: aggregated health and metrics

use std::collections::HashMap;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::GatewayState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub services: HashMap<String, ServiceHealth>,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: Option<u64>,
}

/// Gateway health fans out to every configured upstream's `/health`.
pub async fn health_handler(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let upstreams: HashSet<String> = state
        .routes
        .routes()
        .iter()
        .map(|route| route.upstream.clone())
        .collect();

    let mut services = HashMap::new();
    for upstream in upstreams {
        let health = check_upstream(&state.http_client, &upstream).await;
        services.insert(upstream, health);
    }

    let status = if services.values().all(|s| s.status == "healthy") {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        services,
    })
}

async fn check_upstream(client: &reqwest::Client, upstream: &str) -> ServiceHealth {
    let start = Instant::now();
    let result = client
        .get(format!("{}/health", upstream))
        .timeout(Duration::from_secs(2))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => ServiceHealth {
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
        },
        Ok(_) | Err(_) => ServiceHealth {
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
        },
    }
}

pub async fn metrics_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    state.metrics.render()
}
