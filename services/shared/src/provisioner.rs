// Idempotent per-tenant schema provisioning

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::schema::{quote_ident, validate_schema_name};
use crate::{Result, ServiceError};

/// A single versioned migration, scoped to one tenant schema. Statements run
/// with the schema pinned as the search path, so table names stay
/// unqualified.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Ensures tenant schemas exist and carry the full migration chain.
///
/// Concurrent callers for the same schema serialize on a transaction-scoped
/// advisory lock, so exactly one migrator runs per (schema, version) pair
/// across all processes sharing the database.
pub struct SchemaProvisioner {
    pool: PgPool,
    migrations: &'static [Migration],
    // Fast path: schemas this process has already brought up to date.
    ensured: Mutex<HashSet<String>>,
}

impl SchemaProvisioner {
    pub fn new(pool: PgPool, migrations: &'static [Migration]) -> Arc<Self> {
        Arc::new(Self {
            pool,
            migrations,
            ensured: Mutex::new(HashSet::new()),
        })
    }

    /// Idempotently creates `schema` and applies any missing migrations.
    /// Called by the schema-creation event listener at tenant activation and
    /// as an on-demand safety net by write paths whose schema is missing.
    pub async fn ensure_ready(&self, schema: &str) -> Result<()> {
        validate_schema_name(schema)?;

        {
            let ensured = self.ensured.lock().await;
            if ensured.contains(schema) {
                return Ok(());
            }
        }

        self.provision(schema).await?;

        self.ensured.lock().await.insert(schema.to_string());
        Ok(())
    }

    async fn provision(&self, schema: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Serialize migrators across processes. The lock is released with
        // the transaction, never held across non-database I/O.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_lock_key(schema))
            .execute(&mut *tx)
            .await?;

        let exists: bool = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(schema)
        .fetch_one(&mut *tx)
        .await?
        .get(0);

        if !exists {
            info!(schema = %schema, "Creating tenant schema");
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
                .execute(&mut *tx)
                .await
                .map_err(|e| ServiceError::SchemaProvisioningFailed {
                    schema: schema.to_string(),
                    message: e.to_string(),
                })?;
        }

        // Pin the search path for the remainder of the transaction so the
        // migration ledger and all migration DDL land in the tenant schema.
        sqlx::query(&format!("SET LOCAL search_path TO {}", quote_ident(schema)))
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        let applied: HashSet<i64> = sqlx::query("SELECT version FROM schema_migrations")
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|row| row.get::<i64, _>(0))
            .collect();

        for migration in self.migrations {
            if applied.contains(&migration.version) {
                continue;
            }
            debug!(
                schema = %schema,
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            sqlx::query(migration.sql).execute(&mut *tx).await.map_err(|e| {
                warn!(
                    schema = %schema,
                    version = migration.version,
                    error = %e,
                    "Migration failed"
                );
                ServiceError::MigrationFailed {
                    schema: schema.to_string(),
                    version: migration.version,
                    message: e.to_string(),
                }
            })?;
            sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(schema = %schema, "Tenant schema ready");
        Ok(())
    }
}

/// Stable 64-bit key for the advisory lock, derived from the schema name
/// (FNV-1a). Collisions would only widen the critical section, never shrink
/// it.
fn advisory_lock_key(schema: &str) -> i64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in schema.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as i64
}
