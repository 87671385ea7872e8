// Tenant lifecycle orchestration

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use ldp_shared::database::TenantDatabase;
use ldp_shared::schema::schema_name;
use ldp_shared::{TenantContext, TenantId, TenantStatus};

use crate::error::{TenantServiceError, TenantServiceResult};
use crate::models::{CreateTenantRequest, LifecycleAction, TenantRecord, UpdateTenantRequest};
use crate::repositories::TenantRepository;

/// Lifecycle audit trail, written into the tenant's own schema through the
/// tenant-aware adapter. Binds a context for exactly the write's lifetime.
pub struct TenantAuditLog {
    db: TenantDatabase,
}

impl TenantAuditLog {
    pub fn new(db: TenantDatabase) -> Arc<Self> {
        Arc::new(Self { db })
    }

    pub async fn record(&self, tenant_id: &TenantId, action: &str) -> ldp_shared::Result<()> {
        let ctx = TenantContext::new(tenant_id.clone());
        let action = action.to_string();
        let tenant = tenant_id.clone();
        TenantContext::scope(ctx, async move {
            let mut uow = self.db.begin().await?;
            sqlx::query("INSERT INTO tenant_audit_log (tenant_id, action) VALUES ($1, $2)")
                .bind(tenant.as_str())
                .bind(&action)
                .execute(&mut **uow.tx())
                .await?;
            uow.commit().await
        })
        .await
    }
}

pub struct TenantLifecycleService {
    repo: Arc<dyn TenantRepository>,
    audit: Option<Arc<TenantAuditLog>>,
}

impl TenantLifecycleService {
    pub fn new(repo: Arc<dyn TenantRepository>, audit: Option<Arc<TenantAuditLog>>) -> Self {
        Self { repo, audit }
    }

    pub async fn create_tenant(
        &self,
        request: CreateTenantRequest,
    ) -> TenantServiceResult<TenantRecord> {
        if request.name.trim().is_empty() {
            return Err(TenantServiceError::Validation(
                "tenant name must not be empty".to_string(),
            ));
        }
        if !request.contact_email.contains('@') {
            return Err(TenantServiceError::Validation(
                "contact email is not valid".to_string(),
            ));
        }

        let now = Utc::now();
        let record = TenantRecord {
            schema_name: schema_name(&request.id),
            id: request.id,
            name: request.name,
            contact_email: request.contact_email,
            config: request.config,
            status: TenantStatus::Pending,
            realm: request.realm,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let events = record.creation_events();
        self.repo.create(&record, &events).await?;

        info!(tenant_id = %record.id, "Tenant created");
        Ok(record)
    }

    pub async fn get_tenant(&self, id: &TenantId) -> TenantServiceResult<TenantRecord> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| TenantServiceError::NotFound(id.to_string()))
    }

    pub async fn list_tenants(
        &self,
        limit: i64,
        offset: i64,
    ) -> TenantServiceResult<(Vec<TenantRecord>, u64)> {
        self.repo.list(limit.clamp(1, 200), offset.max(0)).await
    }

    pub async fn update_tenant(
        &self,
        id: &TenantId,
        request: UpdateTenantRequest,
    ) -> TenantServiceResult<TenantRecord> {
        let mut record = self.get_tenant(id).await?;

        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(TenantServiceError::Validation(
                    "tenant name must not be empty".to_string(),
                ));
            }
            record.name = name;
        }
        if let Some(contact_email) = request.contact_email {
            if !contact_email.contains('@') {
                return Err(TenantServiceError::Validation(
                    "contact email is not valid".to_string(),
                ));
            }
            record.contact_email = contact_email;
        }
        if let Some(config) = request.config {
            record.config = config;
        }
        if let Some(realm) = request.realm {
            record.realm = if realm.is_empty() { None } else { Some(realm) };
        }

        self.repo.update(&record).await
    }

    /// Applies a lifecycle verb. The repository makes the transition and its
    /// events one atomic unit; the audit write is best-effort after the
    /// fact.
    pub async fn apply_lifecycle(
        &self,
        id: &TenantId,
        action: LifecycleAction,
    ) -> TenantServiceResult<TenantRecord> {
        let (record, events) = self.repo.transition(id, action).await?;

        info!(
            tenant_id = %record.id,
            action = action.as_str(),
            status = %record.status,
            version = record.version,
            events = events.len(),
            "Tenant transitioned"
        );

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&record.id, action.as_str()).await {
                warn!(tenant_id = %record.id, error = %e, "Audit write failed");
            }
        }

        Ok(record)
    }

    pub async fn get_realm(&self, id: &TenantId) -> TenantServiceResult<Option<String>> {
        let record = self.get_tenant(id).await?;
        Ok(record.realm_or_default().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MockTenantRepository;
    use ldp_shared::events::{TOPIC_TENANT_CREATED, TOPIC_TENANT_SCHEMA_CREATED};
    use std::collections::HashMap;

    fn request(id: &str) -> CreateTenantRequest {
        CreateTenantRequest {
            id: TenantId::new(id).unwrap(),
            name: "Acme Logistics".to_string(),
            contact_email: "ops@acme.example".to_string(),
            config: HashMap::new(),
            realm: None,
        }
    }

    #[tokio::test]
    async fn test_create_derives_schema_and_starts_pending() {
        let mut repo = MockTenantRepository::new();
        repo.expect_create()
            .withf(|record, events| {
                record.status == TenantStatus::Pending
                    && record.version == 1
                    && record.schema_name == "tenant_acme_schema"
                    && events.len() == 1
                    && events[0].event_type == TOPIC_TENANT_CREATED
            })
            .returning(|_, _| Ok(()));

        let service = TenantLifecycleService::new(Arc::new(repo), None);
        let record = service.create_tenant(request("acme")).await.unwrap();
        assert_eq!(record.status, TenantStatus::Pending);
        assert_eq!(record.schema_name, "tenant_acme_schema");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let repo = MockTenantRepository::new();
        let service = TenantLifecycleService::new(Arc::new(repo), None);

        let mut bad_name = request("acme");
        bad_name.name = "  ".to_string();
        assert!(matches!(
            service.create_tenant(bad_name).await,
            Err(TenantServiceError::Validation(_))
        ));

        let mut bad_email = request("acme");
        bad_email.contact_email = "not-an-email".to_string();
        assert!(matches!(
            service.create_tenant(bad_email).await,
            Err(TenantServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_delegates_to_atomic_transition() {
        let mut repo = MockTenantRepository::new();
        repo.expect_transition()
            .withf(|id, action| id.as_str() == "acme" && *action == LifecycleAction::Activate)
            .returning(|id, action| {
                let now = Utc::now();
                let record = TenantRecord {
                    schema_name: schema_name(id),
                    id: id.clone(),
                    name: "Acme Logistics".to_string(),
                    contact_email: "ops@acme.example".to_string(),
                    config: HashMap::new(),
                    status: TenantStatus::Active,
                    realm: None,
                    version: 2,
                    created_at: now,
                    updated_at: now,
                };
                let events = record.transition_events(action, TenantStatus::Pending);
                Ok((record, events))
            });

        let service = TenantLifecycleService::new(Arc::new(repo), None);
        let id = TenantId::new("acme").unwrap();
        let record = service
            .apply_lifecycle(&id, LifecycleAction::Activate)
            .await
            .unwrap();
        assert_eq!(record.status, TenantStatus::Active);
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_invalid_transition_propagates_conflict() {
        let mut repo = MockTenantRepository::new();
        repo.expect_transition().returning(|_, action| {
            Err(TenantServiceError::InvalidTransition {
                action: action.as_str().to_string(),
                status: "PENDING".to_string(),
            })
        });

        let service = TenantLifecycleService::new(Arc::new(repo), None);
        let id = TenantId::new("acme").unwrap();
        let result = service.apply_lifecycle(&id, LifecycleAction::Suspend).await;
        assert!(matches!(
            result,
            Err(TenantServiceError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_realm_lookup() {
        let mut repo = MockTenantRepository::new();
        repo.expect_find_by_id().returning(|id| {
            if id.as_str() == "doesnotexist" {
                return Ok(None);
            }
            let now = Utc::now();
            Ok(Some(TenantRecord {
                schema_name: schema_name(id),
                id: id.clone(),
                name: "Acme Logistics".to_string(),
                contact_email: "ops@acme.example".to_string(),
                config: HashMap::new(),
                status: TenantStatus::Active,
                realm: Some("acme-realm".to_string()),
                version: 2,
                created_at: now,
                updated_at: now,
            }))
        });

        let service = TenantLifecycleService::new(Arc::new(repo), None);

        let realm = service
            .get_realm(&TenantId::new("acme").unwrap())
            .await
            .unwrap();
        assert_eq!(realm.as_deref(), Some("acme-realm"));

        // Unknown tenant surfaces as not-found, never a 500.
        let missing = service.get_realm(&TenantId::new("doesnotexist").unwrap()).await;
        assert!(matches!(missing, Err(TenantServiceError::NotFound(_))));
    }

    #[test]
    fn test_schema_event_payload_names_the_derived_schema() {
        let id = TenantId::new("acme").unwrap();
        let now = Utc::now();
        let record = TenantRecord {
            schema_name: schema_name(&id),
            id,
            name: "Acme Logistics".to_string(),
            contact_email: "ops@acme.example".to_string(),
            config: HashMap::new(),
            status: TenantStatus::Active,
            realm: None,
            version: 2,
            created_at: now,
            updated_at: now,
        };

        let events = record.transition_events(LifecycleAction::Activate, TenantStatus::Pending);
        let schema_event = events
            .iter()
            .find(|e| e.event_type == TOPIC_TENANT_SCHEMA_CREATED)
            .unwrap();
        assert_eq!(schema_event.payload["schemaName"], "tenant_acme_schema");
        assert_eq!(schema_event.payload["tenantId"], "acme");
    }
}
