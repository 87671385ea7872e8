use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ldp_shared::ServiceError;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Edge-facing errors. Bodies stay generic on authentication and
/// authorization paths; the real cause is logged with the correlation id,
/// never sent to the client.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("No route matches the request path")]
    RouteNotFound,

    #[error("Upstream unavailable: {service}")]
    UpstreamUnavailable { service: String },

    #[error("Upstream timed out: {service}")]
    UpstreamTimeout { service: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::Forbidden => "FORBIDDEN",
            GatewayError::RateLimited { .. } => "RATE_LIMITED",
            GatewayError::RouteNotFound => "ROUTE_NOT_FOUND",
            GatewayError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            GatewayError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            GatewayError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message. Deliberately generic for 401/403: the body
    /// must not reveal which check failed.
    fn public_message(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "authentication required",
            GatewayError::Forbidden => "access denied",
            GatewayError::RateLimited { .. } => "rate limit exceeded",
            GatewayError::RouteNotFound => "not found",
            GatewayError::UpstreamUnavailable { .. } => "upstream unavailable",
            GatewayError::UpstreamTimeout { .. } => "upstream timed out",
            GatewayError::Internal { .. } => "internal error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message: self.public_message().to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimited { retry_after_secs } = self {
            let headers = response.headers_mut();
            if let Ok(value) = retry_after_secs.to_string().parse() {
                headers.insert("Retry-After", value);
            }
            headers.insert(
                "X-RateLimit-Remaining",
                axum::http::HeaderValue::from_static("0"),
            );
        }

        response
    }
}

/// Maps verification and authority failures onto the edge taxonomy. Every
/// token problem collapses into a generic 401; only infrastructure failures
/// keep their shape.
impl From<ServiceError> for GatewayError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::MalformedToken
            | ServiceError::InvalidSignature
            | ServiceError::ExpiredToken
            | ServiceError::InvalidIssuer
            | ServiceError::MissingRequiredClaim(_) => GatewayError::Unauthorized,
            ServiceError::TenantNotActive(_)
            | ServiceError::TenantMismatch { .. }
            | ServiceError::TenantNotFound(_) => GatewayError::Forbidden,
            ServiceError::RateLimited { retry_after_secs } => {
                GatewayError::RateLimited { retry_after_secs }
            }
            ServiceError::UpstreamUnavailable(service) => {
                GatewayError::UpstreamUnavailable { service }
            }
            other => GatewayError::Internal {
                message: other.to_string(),
            },
        }
    }
}
