// Catalog persistence: tenant table and transactional outbox

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;

use ldp_shared::events::Event;
use ldp_shared::{TenantId, TenantStatus};

use crate::error::{TenantServiceError, TenantServiceResult};
use crate::models::{LifecycleAction, TenantRecord};

/// Shared catalog DDL, applied idempotently at startup. Tenant-scoped
/// tables live in per-tenant schemas; only the tenant registry and the
/// event outbox live here.
const CATALOG_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        contact_email TEXT NOT NULL,
        config JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL,
        realm TEXT,
        schema_name TEXT NOT NULL UNIQUE,
        version BIGINT NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_outbox (
        id BIGSERIAL PRIMARY KEY,
        event_id UUID NOT NULL,
        event_type TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        version BIGINT NOT NULL,
        payload JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        published_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_tenant_outbox_unpublished
        ON tenant_outbox (id) WHERE published_at IS NULL
    "#,
];

pub async fn run_catalog_migrations(pool: &PgPool) -> TenantServiceResult<()> {
    for statement in CATALOG_DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Catalog schema ready");
    Ok(())
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Inserts the record and its creation events in one transaction.
    async fn create(&self, record: &TenantRecord, events: &[Event]) -> TenantServiceResult<()>;

    async fn find_by_id(&self, id: &TenantId) -> TenantServiceResult<Option<TenantRecord>>;

    async fn list(&self, limit: i64, offset: i64)
        -> TenantServiceResult<(Vec<TenantRecord>, u64)>;

    /// Updates the mutable fields; identifier, status, and version are
    /// untouched.
    async fn update(&self, record: &TenantRecord) -> TenantServiceResult<TenantRecord>;

    /// Applies `action` atomically: row lock, transition check, version
    /// bump, outbox insert. Exactly one lifecycle event (plus the
    /// schema-created event when entering ACTIVE) is recorded with the
    /// transition.
    async fn transition(
        &self,
        id: &TenantId,
        action: LifecycleAction,
    ) -> TenantServiceResult<(TenantRecord, Vec<Event>)>;
}

pub struct PostgresTenantRepository {
    pool: PgPool,
}

impl PostgresTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> TenantServiceResult<TenantRecord> {
        let id: String = row.get("id");
        let status: String = row.get("status");
        let config: serde_json::Value = row.get("config");

        Ok(TenantRecord {
            id: TenantId::new(id)
                .map_err(|e| TenantServiceError::Internal(format!("stored tenant id: {}", e)))?,
            name: row.get("name"),
            contact_email: row.get("contact_email"),
            config: serde_json::from_value(config)
                .map_err(|e| TenantServiceError::Internal(format!("stored config: {}", e)))?,
            status: TenantStatus::parse(&status).ok_or_else(|| {
                TenantServiceError::Internal(format!("stored status '{}'", status))
            })?,
            realm: row.get("realm"),
            schema_name: row.get("schema_name"),
            version: row.get("version"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn insert_outbox(
        tx: &mut Transaction<'_, Postgres>,
        events: &[Event],
    ) -> TenantServiceResult<()> {
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO tenant_outbox (event_id, event_type, tenant_id, version, payload)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.id)
            .bind(&event.event_type)
            .bind(event.tenant_id.as_str())
            .bind(event.version)
            .bind(&event.payload)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn create(&self, record: &TenantRecord, events: &[Event]) -> TenantServiceResult<()> {
        let mut tx = self.pool.begin().await?;

        let config = serde_json::to_value(&record.config)
            .map_err(|e| TenantServiceError::Internal(format!("config encode: {}", e)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO tenants (
                id, name, contact_email, config, status, realm,
                schema_name, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(&record.contact_email)
        .bind(&config)
        .bind(record.status.as_str())
        .bind(&record.realm)
        .bind(&record.schema_name)
        .bind(record.version)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(result) if result.rows_affected() == 0 => {
                return Err(TenantServiceError::AlreadyExists(record.id.to_string()));
            }
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.constraint() == Some("tenants_schema_name_key") => {
                // Two distinct identifiers sanitizing to one schema name is
                // a configuration error caught here, at create time.
                return Err(TenantServiceError::SchemaCollision {
                    schema: record.schema_name.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        Self::insert_outbox(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &TenantId) -> TenantServiceResult<Option<TenantRecord>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::record_from_row(&row)).transpose()
    }

    async fn list(
        &self,
        limit: i64,
        offset: i64,
    ) -> TenantServiceResult<(Vec<TenantRecord>, u64)> {
        let rows = sqlx::query("SELECT * FROM tenants ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query("SELECT count(*) FROM tenants")
            .fetch_one(&self.pool)
            .await?
            .get(0);

        let records = rows
            .iter()
            .map(Self::record_from_row)
            .collect::<TenantServiceResult<Vec<_>>>()?;
        Ok((records, total as u64))
    }

    async fn update(&self, record: &TenantRecord) -> TenantServiceResult<TenantRecord> {
        let config = serde_json::to_value(&record.config)
            .map_err(|e| TenantServiceError::Internal(format!("config encode: {}", e)))?;

        let row = sqlx::query(
            r#"
            UPDATE tenants
            SET name = $2, contact_email = $3, config = $4, realm = $5, updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(&record.contact_email)
        .bind(&config)
        .bind(&record.realm)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| TenantServiceError::NotFound(record.id.to_string()))?;

        Self::record_from_row(&row)
    }

    async fn transition(
        &self,
        id: &TenantId,
        action: LifecycleAction,
    ) -> TenantServiceResult<(TenantRecord, Vec<Event>)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1 FOR UPDATE")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| TenantServiceError::NotFound(id.to_string()))?;

        let current = Self::record_from_row(&row)?;

        let next_status = action.target_status(current.status).ok_or_else(|| {
            TenantServiceError::InvalidTransition {
                action: action.as_str().to_string(),
                status: current.status.to_string(),
            }
        })?;

        let row = sqlx::query(
            r#"
            UPDATE tenants
            SET status = $2, version = version + 1, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_str())
        .bind(next_status.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let updated = Self::record_from_row(&row)?;
        let events = updated.transition_events(action, current.status);

        Self::insert_outbox(&mut tx, &events).await?;
        tx.commit().await?;

        Ok((updated, events))
    }
}

/// One unpublished outbox entry.
#[derive(Debug)]
pub struct OutboxEntry {
    pub id: i64,
    pub event: Event,
}

pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Oldest-first keeps per-tenant publication order.
    pub async fn fetch_unpublished(&self, limit: i64) -> TenantServiceResult<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, event_type, tenant_id, version, payload, created_at
            FROM tenant_outbox
            WHERE published_at IS NULL
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let tenant_id: String = row.get("tenant_id");
                Ok(OutboxEntry {
                    id: row.get("id"),
                    event: Event {
                        id: row.get("event_id"),
                        event_type: row.get("event_type"),
                        tenant_id: TenantId::new(tenant_id).map_err(|e| {
                            TenantServiceError::Internal(format!("stored tenant id: {}", e))
                        })?,
                        version: row.get("version"),
                        payload: row.get("payload"),
                        timestamp: row.get("created_at"),
                    },
                })
            })
            .collect()
    }

    pub async fn mark_published(&self, id: i64) -> TenantServiceResult<()> {
        sqlx::query("UPDATE tenant_outbox SET published_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
