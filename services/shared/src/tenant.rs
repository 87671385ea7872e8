// Tenant identity and request-scoped tenant context

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

use crate::{Result, ServiceError};

pub const MAX_TENANT_ID_LEN: usize = 50;

/// Opaque tenant identifier. 1-50 characters of `[A-Za-z0-9_-]`, validated
/// at construction. This is the stable foreign key everywhere: in tokens as
/// the `tenant_id` claim, in the `tenant-id` header, and in every
/// tenant-scoped row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_TENANT_ID_LEN {
            return Err(ServiceError::InvalidTenantId(format!(
                "length must be 1-{} characters",
                MAX_TENANT_ID_LEN
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ServiceError::InvalidTenantId(
                "only [A-Za-z0-9_-] is allowed".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TenantId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TenantId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a tenant. Only ACTIVE tenants participate in
/// data-plane traffic; the transition rules live with the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Pending,
    Active,
    Suspended,
    Inactive,
}

impl TenantStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TenantStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "PENDING",
            TenantStatus::Active => "ACTIVE",
            TenantStatus::Suspended => "SUSPENDED",
            TenantStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(TenantStatus::Pending),
            "ACTIVE" => Some(TenantStatus::Active),
            "SUSPENDED" => Some(TenantStatus::Suspended),
            "INACTIVE" => Some(TenantStatus::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request binding of (tenant, user, roles). Set by the service-side
/// interceptor on entry, read by persistence and domain code, dropped
/// automatically when the request future completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub user_id: Option<String>,
    pub roles: Vec<String>,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: None,
            roles: Vec::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, roles: Vec<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.roles = roles;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Binds `ctx` for the lifetime of `fut`. The binding is task-local, not
    /// thread-local: it follows the future across worker threads and is
    /// cleared on every exit path, normal or panicking. Crossing a `spawn`
    /// requires an explicit re-bind with a copy.
    pub async fn scope<F>(ctx: TenantContext, fut: F) -> F::Output
    where
        F: Future,
    {
        TENANT_CONTEXT.scope(ctx, fut).await
    }

    /// Returns the context bound to the current task, if any.
    pub fn current() -> Option<TenantContext> {
        TENANT_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Returns the bound context or `MissingTenantContext`. Consumers must
    /// never substitute a default tenant.
    pub fn require() -> Result<TenantContext> {
        TenantContext::current().ok_or(ServiceError::MissingTenantContext)
    }
}

tokio::task_local! {
    static TENANT_CONTEXT: TenantContext;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_accepts_valid_identifiers() {
        assert!(TenantId::new("ldp-123").is_ok());
        assert!(TenantId::new("ACME_warehouse").is_ok());
        assert!(TenantId::new("a").is_ok());
        assert!(TenantId::new("x".repeat(50)).is_ok());
    }

    #[test]
    fn test_tenant_id_rejects_invalid_identifiers() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("x".repeat(51)).is_err());
        assert!(TenantId::new("ldp 123").is_err());
        assert!(TenantId::new("ldp.123").is_err());
        assert!(TenantId::new("ldp;DROP TABLE tenants").is_err());
        assert!(TenantId::new("ünïcode").is_err());
    }

    #[test]
    fn test_tenant_status_round_trip() {
        for status in [
            TenantStatus::Pending,
            TenantStatus::Active,
            TenantStatus::Suspended,
            TenantStatus::Inactive,
        ] {
            assert_eq!(TenantStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert_eq!(TenantStatus::parse("UNKNOWN"), None);
        assert!(TenantStatus::Active.is_active());
        assert!(!TenantStatus::Suspended.is_active());
    }

    #[test]
    fn test_tenant_id_deserialization_validates() {
        let ok: std::result::Result<TenantId, _> = serde_json::from_str("\"ldp-123\"");
        assert!(ok.is_ok());

        let bad: std::result::Result<TenantId, _> = serde_json::from_str("\"not valid!\"");
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_context_is_absent_outside_scope() {
        assert!(TenantContext::current().is_none());
        assert!(matches!(
            TenantContext::require(),
            Err(ServiceError::MissingTenantContext)
        ));
    }

    #[tokio::test]
    async fn test_context_bound_within_scope() {
        let ctx = TenantContext::new(TenantId::new("ldp-123").unwrap())
            .with_user("user-1", vec!["operator".to_string()]);

        let seen = TenantContext::scope(ctx.clone(), async {
            let current = TenantContext::require().unwrap();
            assert!(current.has_role("operator"));
            current
        })
        .await;

        assert_eq!(seen, ctx);
        // Cleared once the scope ends.
        assert!(TenantContext::current().is_none());
    }

    #[tokio::test]
    async fn test_context_does_not_leak_into_spawned_tasks() {
        let ctx = TenantContext::new(TenantId::new("ldp-123").unwrap());

        TenantContext::scope(ctx, async {
            let handle = tokio::spawn(async { TenantContext::current() });
            assert!(handle.await.unwrap().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn test_nested_scopes_shadow_and_restore() {
        let outer = TenantContext::new(TenantId::new("outer").unwrap());
        let inner = TenantContext::new(TenantId::new("inner").unwrap());

        TenantContext::scope(outer.clone(), async {
            TenantContext::scope(inner.clone(), async {
                assert_eq!(TenantContext::require().unwrap().tenant_id, inner.tenant_id);
            })
            .await;
            assert_eq!(TenantContext::require().unwrap().tenant_id, outer.tenant_id);
        })
        .await;
    }
}
