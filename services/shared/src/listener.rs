// Schema-provisioning event listener, run by every service

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::events::{
    Event, EventBus, EventBusError, EventHandler, EventHandlerError, TenantSchemaCreatedPayload,
    TOPIC_TENANT_SCHEMA_CREATED,
};
use crate::provisioner::SchemaProvisioner;
use crate::schema::schema_name;

/// Consumes `tenant.schema.created` and brings the local database up to
/// date. Idempotent on replay: delivery is at-least-once, and the dedupe
/// set only short-circuits work `ensure_ready` would no-op anyway.
pub struct SchemaProvisioningListener {
    provisioner: Arc<SchemaProvisioner>,
    seen: Mutex<HashSet<(String, i64)>>,
}

impl SchemaProvisioningListener {
    pub fn new(provisioner: Arc<SchemaProvisioner>) -> Arc<Self> {
        Arc::new(Self {
            provisioner,
            seen: Mutex::new(HashSet::new()),
        })
    }

    /// Registers this listener on the bus under the service's consumer
    /// group.
    pub async fn register(
        self: Arc<Self>,
        bus: &dyn EventBus,
        consumer_group: &str,
    ) -> Result<(), EventBusError> {
        bus.subscribe(TOPIC_TENANT_SCHEMA_CREATED, consumer_group, self)
            .await
    }
}

#[async_trait]
impl EventHandler for SchemaProvisioningListener {
    async fn handle(&self, event: &Event) -> Result<(), EventHandlerError> {
        let dedupe_key = (event.tenant_id.to_string(), event.version);
        {
            let seen = self.seen.lock().await;
            if seen.contains(&dedupe_key) {
                return Ok(());
            }
        }

        // Prefer the published schema name; fall back to derivation when the
        // payload is from an older producer.
        let schema = match serde_json::from_value::<TenantSchemaCreatedPayload>(event.payload.clone())
        {
            Ok(payload) => payload.schema_name,
            Err(_) => schema_name(&event.tenant_id),
        };

        match self.provisioner.ensure_ready(&schema).await {
            Ok(()) => {
                info!(
                    tenant_id = %event.tenant_id,
                    schema = %schema,
                    version = event.version,
                    "Tenant schema provisioned from event"
                );
                self.seen.lock().await.insert(dedupe_key);
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    tenant_id = %event.tenant_id,
                    schema = %schema,
                    error = %e,
                    "Schema provisioning failed transiently, expecting redelivery"
                );
                Err(EventHandlerError::Retry(e.to_string()))
            }
            Err(e) => Err(EventHandlerError::Handler(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::Migration;
    use crate::tenant::TenantId;
    use chrono::Utc;

    const NO_MIGRATIONS: &[Migration] = &[];

    fn listener() -> Arc<SchemaProvisioningListener> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/none")
            .unwrap();
        SchemaProvisioningListener::new(SchemaProvisioner::new(pool, NO_MIGRATIONS))
    }

    fn schema_created_event(tenant: &str, version: i64) -> Event {
        let tenant_id = TenantId::new(tenant).unwrap();
        let payload = TenantSchemaCreatedPayload {
            tenant_id: tenant_id.clone(),
            schema_name: schema_name(&tenant_id),
            version,
            timestamp: Utc::now(),
        };
        Event::new(
            TOPIC_TENANT_SCHEMA_CREATED,
            tenant_id,
            version,
            serde_json::to_value(payload).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_replay_of_seen_event_is_acked_without_db_work() {
        let listener = listener();
        listener
            .seen
            .lock()
            .await
            .insert(("acme".to_string(), 1));

        // The pool is unreachable; success proves the dedupe set
        // short-circuited before any database call.
        let result = listener.handle(&schema_created_event("acme", 1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_transient_db_failure_requests_redelivery() {
        let listener = listener();
        let result = listener.handle(&schema_created_event("acme", 2)).await;
        assert!(matches!(result, Err(EventHandlerError::Retry(_))));
        // Not marked seen: the redelivery must retry the work.
        assert!(!listener.seen.lock().await.contains(&("acme".to_string(), 2)));
    }
}
