// Tenant lookups against the orchestrator, cached and circuit-broken

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use ldp_shared::{Result, ServiceError, TenantId, TenantStatus};

use crate::config::TenantAuthorityConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct TenantSummary {
    pub id: TenantId,
    pub status: TenantStatus,
    #[serde(default)]
    pub realm: Option<String>,
}

enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// Opens after N consecutive failures, half-opens after the cooldown; one
/// probe decides whether it closes again.
struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
            threshold,
            cooldown,
        }
    }

    async fn allow_request(&self) -> bool {
        let mut state = self.state.lock().await;
        match &*state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } => {
                if Instant::now() >= *until {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        match &mut *state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.threshold {
                    warn!("Tenant authority circuit breaker opened");
                    *state = BreakerState::Open {
                        until: Instant::now() + self.cooldown,
                    };
                }
            }
            BreakerState::HalfOpen => {
                *state = BreakerState::Open {
                    until: Instant::now() + self.cooldown,
                };
            }
            BreakerState::Open { .. } => {}
        }
    }
}

struct CacheEntry {
    tenant: Option<TenantSummary>,
    cached_at: Instant,
}

/// Client for §tenant lookups at the edge. Results are cached with a small
/// TTL so the status fast path stays off the orchestrator's hot path; fresh
/// reads fail closed when the breaker is open.
pub struct TenantAuthorityClient {
    http: reqwest::Client,
    base_url: String,
    cache_ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
    breaker: CircuitBreaker,
}

impl TenantAuthorityClient {
    pub fn new(config: &TenantAuthorityConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::Configuration(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache_ttl: config.cache_ttl(),
            cache: RwLock::new(HashMap::new()),
            breaker: CircuitBreaker::new(config.failure_threshold, config.open_cooldown()),
        })
    }

    /// Missing tenant is `Ok(None)`, never an error.
    pub async fn get_tenant(&self, id: &TenantId) -> Result<Option<TenantSummary>> {
        if let Some(cached) = self.cached(id).await {
            return Ok(cached);
        }

        if !self.breaker.allow_request().await {
            return Err(ServiceError::UpstreamUnavailable(
                "tenant authority circuit open".to_string(),
            ));
        }

        let url = format!("{}/tenants/{}", self.base_url, id);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.breaker.record_failure().await;
                return Err(ServiceError::UpstreamUnavailable(format!(
                    "tenant authority: {}",
                    e
                )));
            }
        };

        match response.status() {
            status if status.is_success() => {
                let tenant: TenantSummary = response.json().await.map_err(|e| {
                    ServiceError::UpstreamUnavailable(format!("tenant authority decode: {}", e))
                })?;
                self.breaker.record_success().await;
                self.store(id, Some(tenant.clone())).await;
                Ok(Some(tenant))
            }
            reqwest::StatusCode::NOT_FOUND => {
                self.breaker.record_success().await;
                self.store(id, None).await;
                Ok(None)
            }
            status => {
                self.breaker.record_failure().await;
                Err(ServiceError::UpstreamUnavailable(format!(
                    "tenant authority: status {}",
                    status
                )))
            }
        }
    }

    pub async fn get_tenant_status(&self, id: &TenantId) -> Result<Option<TenantStatus>> {
        Ok(self.get_tenant(id).await?.map(|t| t.status))
    }

    pub async fn get_tenant_realm(&self, id: &TenantId) -> Result<Option<String>> {
        Ok(self.get_tenant(id).await?.and_then(|t| t.realm))
    }

    async fn cached(&self, id: &TenantId) -> Option<Option<TenantSummary>> {
        let cache = self.cache.read().await;
        let entry = cache.get(id.as_str())?;
        if entry.cached_at.elapsed() < self.cache_ttl {
            debug!(tenant_id = %id, "Tenant authority cache hit");
            Some(entry.tenant.clone())
        } else {
            None
        }
    }

    async fn store(&self, id: &TenantId, tenant: Option<TenantSummary>) {
        let mut cache = self.cache.write().await;
        cache.insert(
            id.as_str().to_string(),
            CacheEntry {
                tenant,
                cached_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(uri: &str, threshold: u32) -> TenantAuthorityClient {
        TenantAuthorityClient::new(&TenantAuthorityConfig {
            base_url: uri.to_string(),
            timeout_millis: 500,
            cache_ttl_seconds: 10,
            failure_threshold: threshold,
            open_cooldown_seconds: 30,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_parses_tenant_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tenants/ldp-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id":"ldp-123","name":"LDP 123","status":"ACTIVE","realm":"ldp-realm"}"#,
            ))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 5);
        let tenant_id = TenantId::new("ldp-123").unwrap();

        let tenant = client.get_tenant(&tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.realm.as_deref(), Some("ldp-realm"));
    }

    #[tokio::test]
    async fn test_missing_tenant_is_none_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tenants/doesnotexist"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 5);
        let tenant_id = TenantId::new("doesnotexist").unwrap();

        assert!(client.get_tenant(&tenant_id).await.unwrap().is_none());
        assert!(client.get_tenant_realm(&tenant_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_lookups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tenants/ldp-123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id":"ldp-123","status":"ACTIVE"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 5);
        let tenant_id = TenantId::new("ldp-123").unwrap();

        for _ in 0..3 {
            let status = client.get_tenant_status(&tenant_id).await.unwrap();
            assert_eq!(status, Some(TenantStatus::Active));
        }
    }

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 2);

        // Distinct tenants to dodge the cache; two failures trip the breaker.
        for name in ["t-one", "t-two"] {
            let id = TenantId::new(name).unwrap();
            assert!(client.get_tenant(&id).await.is_err());
        }

        // Third call fails fast without reaching the server.
        let requests_before = server.received_requests().await.unwrap().len();
        let id = TenantId::new("t-three").unwrap();
        let result = client.get_tenant(&id).await;
        assert!(matches!(result, Err(ServiceError::UpstreamUnavailable(_))));
        assert_eq!(server.received_requests().await.unwrap().len(), requests_before);
    }

    #[tokio::test]
    async fn test_cached_reads_survive_an_open_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tenants/ldp-123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id":"ldp-123","status":"ACTIVE"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 1);
        let cached_id = TenantId::new("ldp-123").unwrap();
        client.get_tenant(&cached_id).await.unwrap();

        // Trip the breaker with an uncached tenant.
        let other = TenantId::new("t-other").unwrap();
        assert!(client.get_tenant(&other).await.is_err());

        // Cached tenant still resolves; a fresh one fails closed.
        assert!(client.get_tenant(&cached_id).await.unwrap().is_some());
        let fresh = TenantId::new("t-fresh").unwrap();
        assert!(client.get_tenant(&fresh).await.is_err());
    }
}
