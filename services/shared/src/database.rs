// Database utilities and the tenant-aware persistence adapter

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::provisioner::SchemaProvisioner;
use crate::schema::{quote_ident, schema_name, validate_schema_name};
use crate::tenant::{TenantContext, TenantId};
use crate::{Result, ServiceError};

pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// A unit of work pinned to one tenant schema.
///
/// The transaction's search path is set to the tenant schema with
/// `SET LOCAL`, so the pin dies with the transaction and the pooled
/// connection returns to the pool neutral. Query text still carries
/// `WHERE tenant_id = $n` on tenant-scoped tables; the search path narrows
/// the namespace, the predicate is the second layer.
pub struct TenantUnitOfWork<'a> {
    tx: Transaction<'a, Postgres>,
    context: TenantContext,
    schema: String,
}

impl<'a> TenantUnitOfWork<'a> {
    pub fn tx(&mut self) -> &mut Transaction<'a, Postgres> {
        &mut self.tx
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Tenant-aware access to the service database. Every unit of work asserts
/// the task-local tenant context, resolves and validates the schema,
/// provisions it if the schema-created event has not arrived yet, and pins
/// the search path for the transaction's lifetime.
pub struct TenantDatabase {
    pool: PgPool,
    provisioner: Arc<SchemaProvisioner>,
}

impl TenantDatabase {
    pub fn new(pool: PgPool, provisioner: Arc<SchemaProvisioner>) -> Self {
        Self { pool, provisioner }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Asserts that an explicit tenant argument matches the bound context.
    pub fn assert_tenant(&self, requested: &TenantId) -> Result<TenantContext> {
        let ctx = TenantContext::require()?;
        if &ctx.tenant_id != requested {
            return Err(ServiceError::TenantMismatch {
                bound: ctx.tenant_id.to_string(),
                requested: requested.to_string(),
            });
        }
        Ok(ctx)
    }

    /// Opens a transaction scoped to the bound tenant's schema.
    pub async fn begin(&self) -> Result<TenantUnitOfWork<'_>> {
        let ctx = TenantContext::require()?;
        self.begin_for(&ctx).await
    }

    /// Opens a transaction for `requested`, verifying it against the bound
    /// context first.
    pub async fn begin_checked(&self, requested: &TenantId) -> Result<TenantUnitOfWork<'_>> {
        let ctx = self.assert_tenant(requested)?;
        self.begin_for(&ctx).await
    }

    async fn begin_for(&self, ctx: &TenantContext) -> Result<TenantUnitOfWork<'_>> {
        let schema = schema_name(&ctx.tenant_id);
        validate_schema_name(&schema)?;

        // Cheap after first success; covers event loss or delayed delivery.
        // Transient provisioning failures retry with bounded backoff before
        // surfacing as unavailable.
        let mut delay = Duration::from_millis(50);
        let mut attempt = 0;
        loop {
            match self.provisioner.ensure_ready(&schema).await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && attempt < 3 => {
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ServiceError::SchemaProvisioningFailed {
                        schema,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let mut tx = self.pool.begin().await?;
        // Identifier is validated and quoted; SET LOCAL cannot take binds.
        let pin = format!("SET LOCAL search_path TO {}", quote_ident(&schema));
        sqlx::query(&pin).execute(&mut *tx).await?;

        Ok(TenantUnitOfWork {
            tx,
            context: ctx.clone(),
            schema,
        })
    }

    /// Returns the search path active inside a unit of work. Test hook for
    /// the search-path invariant.
    pub async fn current_search_path(uow: &mut TenantUnitOfWork<'_>) -> Result<String> {
        let row = sqlx::query("SHOW search_path")
            .fetch_one(&mut **uow.tx())
            .await?;
        Ok(row.get::<String, _>(0))
    }
}
