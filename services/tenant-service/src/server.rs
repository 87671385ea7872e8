use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use ldp_shared::database::{DatabaseManager, TenantDatabase};
use ldp_shared::events::{EventBus, RedisEventBus};
use ldp_shared::health::{DatabaseHealthCheck, HealthChecker, HealthStatus, RedisHealthCheck};
use ldp_shared::listener::SchemaProvisioningListener;
use ldp_shared::middleware::{correlation_id_middleware, request_logging_middleware};
use ldp_shared::provisioner::{Migration, SchemaProvisioner};

use crate::config::TenantServiceConfig;
use crate::error::{TenantServiceError, TenantServiceResult};
use crate::handlers::{
    create_tenant, delete_tenant, get_realm, get_tenant, lifecycle, list_tenants, update_tenant,
    ServiceState,
};
use crate::outbox::OutboxRelay;
use crate::repositories::{
    run_catalog_migrations, OutboxRepository, PostgresTenantRepository, TenantRepository,
};
use crate::service::{TenantAuditLog, TenantLifecycleService};

/// Per-tenant schema migrations owned by this service.
pub const TENANT_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "audit_log_baseline",
    sql: r#"
        CREATE TABLE IF NOT EXISTS tenant_audit_log (
            id BIGSERIAL PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            action TEXT NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    "#,
}];

pub struct TenantServiceServer {
    config: Arc<TenantServiceConfig>,
    app: Router,
    outbox_relay: Option<OutboxRelay>,
}

impl TenantServiceServer {
    pub async fn new(config: TenantServiceConfig) -> TenantServiceResult<Self> {
        let config = Arc::new(config);

        info!("Initializing tenant service");

        let db = DatabaseManager::new(&config.database.url, config.database.max_connections)
            .await
            .map_err(|e| TenantServiceError::Internal(e.to_string()))?;
        let pool = db.pool().clone();

        run_catalog_migrations(&pool).await?;

        let provisioner = SchemaProvisioner::new(pool.clone(), TENANT_MIGRATIONS);
        let tenant_db = TenantDatabase::new(pool.clone(), provisioner.clone());
        let audit = TenantAuditLog::new(tenant_db);

        let bus: Arc<dyn EventBus> = Arc::new(
            RedisEventBus::connect(&config.redis.url, "tenant-service")
                .await
                .map_err(|e| TenantServiceError::Internal(e.to_string()))?,
        );

        // The orchestrator consumes its own schema-created events too.
        SchemaProvisioningListener::new(provisioner)
            .register(bus.as_ref(), &config.events.consumer_group)
            .await
            .map_err(|e| TenantServiceError::Internal(e.to_string()))?;

        let repo: Arc<dyn TenantRepository> = Arc::new(PostgresTenantRepository::new(pool.clone()));
        let service = Arc::new(TenantLifecycleService::new(repo, Some(audit)));

        let outbox_relay = OutboxRelay::new(
            OutboxRepository::new(pool.clone()),
            bus,
            config.events.outbox_poll_interval(),
        );

        let redis_client = redis::Client::open(config.redis.url.as_str())?;
        let health = Arc::new(
            HealthChecker::new(env!("CARGO_PKG_VERSION"))
                .add_check(DatabaseHealthCheck::new(pool))
                .add_check(RedisHealthCheck::new(redis_client)),
        );

        let app = Self::build_router(service, health);

        Ok(Self {
            config,
            app,
            outbox_relay: Some(outbox_relay),
        })
    }

    fn build_router(service: ServiceState, health: Arc<HealthChecker>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .with_state(health)
            .merge(api_router(service))
            .layer(middleware::from_fn(request_logging_middleware))
            .layer(middleware::from_fn(correlation_id_middleware))
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(mut self) -> TenantServiceResult<()> {
        if let Some(relay) = self.outbox_relay.take() {
            tokio::spawn(relay.run());
        }

        let addr = self.config.server.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TenantServiceError::Internal(format!("bind {}: {}", addr, e)))?;

        info!(addr = %addr, "Tenant service listening");

        axum::serve(listener, self.app)
            .await
            .map_err(|e| TenantServiceError::Internal(format!("server: {}", e)))?;

        Ok(())
    }
}

/// The tenant API surface, shared between the production router and
/// in-process test harnesses.
pub fn api_router(service: ServiceState) -> Router {
    Router::new()
        .route("/tenants", post(create_tenant).get(list_tenants))
        .route(
            "/tenants/:id",
            get(get_tenant).put(update_tenant).delete(delete_tenant),
        )
        .route("/tenants/:id/realm", get(get_realm))
        .route("/tenants/:id/:verb", post(lifecycle))
        .with_state(service)
}

async fn health_handler(State(health): State<Arc<HealthChecker>>) -> Json<HealthStatus> {
    Json(health.check_health().await)
}
