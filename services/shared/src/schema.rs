// Tenant schema naming

use crate::tenant::{TenantContext, TenantId};
use crate::{Result, ServiceError};

pub const SCHEMA_PREFIX: &str = "tenant_";
pub const SCHEMA_SUFFIX: &str = "_schema";

/// Lowercases the tenant identifier and replaces anything outside
/// `[a-z0-9_]` with `_`. Idempotent: `sanitize(sanitize(t)) == sanitize(t)`.
pub fn sanitize(tenant_id: &str) -> String {
    tenant_id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derives the schema name for a tenant: `tenant_<sanitized>_schema`.
pub fn schema_name(tenant_id: &TenantId) -> String {
    format!("{}{}{}", SCHEMA_PREFIX, sanitize(tenant_id.as_str()), SCHEMA_SUFFIX)
}

/// Resolves the schema for the tenant bound to the current task.
pub fn resolve_schema() -> Result<String> {
    let ctx = TenantContext::require()?;
    Ok(schema_name(&ctx.tenant_id))
}

// PostgreSQL identifier limit is 63; prefix + suffix + 50-char sanitized id
// stays within it.
fn is_valid_schema_name(name: &str) -> bool {
    let Some(inner) = name
        .strip_prefix(SCHEMA_PREFIX)
        .and_then(|rest| rest.strip_suffix(SCHEMA_SUFFIX))
    else {
        return false;
    };
    !inner.is_empty()
        && inner.len() <= 50
        && inner
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Validates a schema name against the derived-name shape before it is ever
/// interpolated into SQL. Anything that fails here is a bug or an injection
/// attempt, never a legitimate tenant.
pub fn validate_schema_name(name: &str) -> Result<()> {
    if is_valid_schema_name(name) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "'{}' is not a valid tenant schema name",
            name
        )))
    }
}

/// Quotes a schema name as a SQL identifier. Callers must have validated the
/// name first; quoting is the second line of defense, not the first.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
