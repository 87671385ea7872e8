// Request middleware shared by every service behind the gateway

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::tenant::{TenantContext, TenantId};

pub const TENANT_ID_HEADER: &str = "tenant-id";
pub const USER_ID_HEADER: &str = "user-id";
pub const ROLE_HEADER: &str = "role";
pub const CORRELATION_ID_HEADER: &str = "correlation-id";

pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_exempt(path: &str) -> bool {
    matches!(path, "/health" | "/metrics")
}

/// Correlation id middleware: reuses the inbound id or generates one, and
/// echoes it on the response so every reply is traceable.
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id);

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// Request logging middleware: method, path, status, duration, correlation
/// id. Never logs headers or bodies.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status(),
        duration_ms = %duration.as_millis(),
        correlation_id = %correlation_id,
        "Request completed"
    );

    response
}

/// Service-side tenant interceptor. Trusts the gateway-injected headers,
/// binds the task-local tenant context for exactly the handler's lifetime,
/// and rejects anything malformed before a handler runs. The task-local
/// scope clears the context on every exit path.
pub async fn tenant_context_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if is_exempt(path) {
        return next.run(request).await;
    }

    let raw_tenant = request
        .headers()
        .get(TENANT_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if raw_tenant.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing tenant-id header").into_response();
    }

    let tenant_id = match TenantId::new(raw_tenant) {
        Ok(id) => id,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "invalid tenant-id header").into_response();
        }
    };

    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let roles: Vec<String> = request
        .headers()
        .get(ROLE_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut context = TenantContext::new(tenant_id);
    if let Some(user_id) = user_id {
        context = context.with_user(user_id, roles);
    } else {
        context.roles = roles;
    }

    TenantContext::scope(context, next.run(request)).await
}
