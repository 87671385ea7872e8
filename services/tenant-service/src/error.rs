use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use ldp_shared::ServiceError;

pub type TenantServiceResult<T> = std::result::Result<T, TenantServiceError>;

#[derive(Error, Debug)]
pub enum TenantServiceError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),

    #[error("Schema name collision: '{schema}' already belongs to another tenant")]
    SchemaCollision { schema: String },

    #[error("Illegal transition: cannot {action} a {status} tenant")]
    InvalidTransition { action: String, status: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    code: String,
    message: String,
}

impl TenantServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TenantServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            TenantServiceError::AlreadyExists(_)
            | TenantServiceError::SchemaCollision { .. }
            | TenantServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            TenantServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            TenantServiceError::Database(_)
            | TenantServiceError::Redis(_)
            | TenantServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            TenantServiceError::NotFound(_) => "TENANT_NOT_FOUND",
            TenantServiceError::AlreadyExists(_) => "TENANT_ALREADY_EXISTS",
            TenantServiceError::SchemaCollision { .. } => "SCHEMA_COLLISION",
            TenantServiceError::InvalidTransition { .. } => "INVALID_TRANSITION",
            TenantServiceError::Validation(_) => "VALIDATION_FAILED",
            TenantServiceError::Database(_) => "DATABASE_ERROR",
            TenantServiceError::Redis(_) => "REDIS_ERROR",
            TenantServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for TenantServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Server-side failures keep their detail in the logs, not the body.
        let message = match &self {
            TenantServiceError::Database(_)
            | TenantServiceError::Redis(_)
            | TenantServiceError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for TenantServiceError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::InvalidTenantId(message) => TenantServiceError::Validation(message),
            ServiceError::TenantNotFound(id) => TenantServiceError::NotFound(id),
            ServiceError::Database(e) => TenantServiceError::Database(e),
            other => TenantServiceError::Internal(other.to_string()),
        }
    }
}
