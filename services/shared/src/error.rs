// Error handling for LDP core services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid tenant identifier: {0}")]
    InvalidTenantId(String),

    #[error("No tenant context bound to the current task")]
    MissingTenantContext,

    #[error("Tenant mismatch: operation targets '{requested}' but context is '{bound}'")]
    TenantMismatch { bound: String, requested: String },

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant is not active: {0}")]
    TenantNotActive(String),

    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token issuer is not trusted")]
    InvalidIssuer,

    #[error("Token is missing required claim: {0}")]
    MissingRequiredClaim(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Schema provisioning failed for '{schema}': {message}")]
    SchemaProvisioningFailed { schema: String, message: String },

    #[error("Migration {version} failed for '{schema}': {message}")]
    MigrationFailed {
        schema: String,
        version: i64,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Database(_)
                | ServiceError::Redis(_)
                | ServiceError::UpstreamUnavailable(_)
                | ServiceError::SchemaProvisioningFailed { .. }
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::MalformedToken
            | ServiceError::InvalidSignature
            | ServiceError::ExpiredToken
            | ServiceError::InvalidIssuer
            | ServiceError::MissingRequiredClaim(_)
            | ServiceError::InvalidCredentials => 401,
            ServiceError::TenantNotActive(_)
            | ServiceError::TenantMismatch { .. }
            | ServiceError::AccountDisabled => 403,
            ServiceError::TenantNotFound(_) => 404,
            ServiceError::InvalidTenantId(_) | ServiceError::Validation(_) => 400,
            ServiceError::RateLimited { .. } => 429,
            ServiceError::UpstreamUnavailable(_) => 502,
            ServiceError::SchemaProvisioningFailed { .. } => 503,
            // A missing context in service code is a programming bug, not a
            // client error.
            ServiceError::MissingTenantContext => 500,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidTenantId(_) => "INVALID_TENANT_ID",
            ServiceError::MissingTenantContext => "MISSING_TENANT_CONTEXT",
            ServiceError::TenantMismatch { .. } => "TENANT_MISMATCH",
            ServiceError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            ServiceError::TenantNotActive(_) => "TENANT_NOT_ACTIVE",
            ServiceError::MalformedToken => "MALFORMED_TOKEN",
            ServiceError::InvalidSignature => "INVALID_SIGNATURE",
            ServiceError::ExpiredToken => "EXPIRED_TOKEN",
            ServiceError::InvalidIssuer => "INVALID_ISSUER",
            ServiceError::MissingRequiredClaim(_) => "MISSING_REQUIRED_CLAIM",
            ServiceError::InvalidCredentials => "INVALID_CREDENTIALS",
            ServiceError::AccountDisabled => "ACCOUNT_DISABLED",
            ServiceError::RateLimited { .. } => "RATE_LIMITED",
            ServiceError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ServiceError::SchemaProvisioningFailed { .. } => "SCHEMA_PROVISIONING_FAILED",
            ServiceError::MigrationFailed { .. } => "MIGRATION_FAILED",
            ServiceError::Database(_) => "DATABASE_ERROR",
            ServiceError::Redis(_) => "REDIS_ERROR",
            ServiceError::Validation(_) => "VALIDATION_FAILED",
            ServiceError::Configuration(_) => "CONFIGURATION_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
