// Edge filter pipeline
//
// Execution order per request: correlation id, CORS, authentication
// (bearer verification, tenant claim, cross-tenant defense, status check,
// header injection), rate limiting, then routing. Public paths skip the
// authentication block but still take rate limiting and a correlation id.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use ldp_shared::middleware::{
    CORRELATION_ID_HEADER, ROLE_HEADER, TENANT_ID_HEADER, USER_ID_HEADER,
};
use ldp_shared::{ServiceError, TenantId, TenantStatus};

use crate::config::is_public_path;
use crate::error::GatewayError;
use crate::server::GatewayState;

/// Identity established by the authentication filter, consumed by the rate
/// limiter and available to handlers.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub roles: Vec<String>,
}

/// CORS filter. Preflights short-circuit; credentials are only ever allowed
/// for a single explicitly-matched origin, never a wildcard.
pub async fn cors_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get("origin")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let allowed = state.config.cors.allowed_origins.clone();
    let matched = origin
        .as_deref()
        .filter(|o| allowed.iter().any(|a| a == o))
        .map(str::to_string);
    let wildcard = allowed.iter().any(|a| a == "*");

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(&mut response, matched.as_deref(), wildcard);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(&mut response, matched.as_deref(), wildcard);
    response
}

fn apply_cors_headers(response: &mut Response, matched: Option<&str>, wildcard: bool) {
    let headers = response.headers_mut();
    if let Some(origin) = matched {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert("Access-Control-Allow-Origin", value);
            headers.insert("Access-Control-Allow-Credentials", HeaderValue::from_static("true"));
            headers.insert("Vary", HeaderValue::from_static("Origin"));
        }
    } else if wildcard {
        headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    } else {
        return;
    }
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type, Authorization, tenant-id, correlation-id"),
    );
    headers.insert(
        "Access-Control-Expose-Headers",
        HeaderValue::from_static("correlation-id, X-RateLimit-Remaining"),
    );
}

/// Authentication filter: bearer verification, tenant claim extraction,
/// cross-tenant defense, tenant status fast path, and header injection.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if is_public_path(&path) {
        // Identity headers are gateway-owned; drop anything the client sent.
        for header in [TENANT_ID_HEADER, USER_ID_HEADER, ROLE_HEADER] {
            request.headers_mut().remove(header);
        }
        return next.run(request).await;
    }

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    // Bearer extraction and verification.
    let token = match bearer_token(&request) {
        Some(token) => token,
        None => {
            warn!(path = %path, correlation_id = %correlation_id, "Missing bearer token");
            return GatewayError::Unauthorized.into_response();
        }
    };

    let claims = match state.verifier.verify(token).await {
        Ok(claims) => claims,
        Err(e @ ServiceError::UpstreamUnavailable(_)) => {
            warn!(correlation_id = %correlation_id, error = %e, "JWKS unavailable");
            return GatewayError::from(e).into_response();
        }
        Err(e) => {
            warn!(correlation_id = %correlation_id, error = %e, "Token verification failed");
            return GatewayError::Unauthorized.into_response();
        }
    };

    // Tenant claim extraction.
    let tenant_id = match claims.tenant_id.as_deref().map(TenantId::new) {
        Some(Ok(tenant_id)) => tenant_id,
        Some(Err(e)) => {
            warn!(correlation_id = %correlation_id, error = %e, "Malformed tenant claim");
            return GatewayError::Forbidden.into_response();
        }
        None => {
            warn!(correlation_id = %correlation_id, "Token carries no tenant claim");
            return GatewayError::Forbidden.into_response();
        }
    };

    // Cross-tenant defense: a client-supplied tenant header must agree with
    // the token.
    if let Some(header_tenant) = request
        .headers()
        .get(TENANT_ID_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        if header_tenant != tenant_id.as_str() {
            warn!(
                correlation_id = %correlation_id,
                claim = %tenant_id,
                "Cross-tenant request rejected"
            );
            return GatewayError::Forbidden.into_response();
        }
    }

    // Tenant status fast path, served from the authority cache.
    match state.tenant_authority.get_tenant_status(&tenant_id).await {
        Ok(Some(TenantStatus::Active)) => {}
        Ok(_) => {
            warn!(correlation_id = %correlation_id, "Tenant not active");
            return GatewayError::Forbidden.into_response();
        }
        Err(e) => {
            warn!(correlation_id = %correlation_id, error = %e, "Tenant authority unreachable");
            return GatewayError::from(e).into_response();
        }
    }

    // Header injection: always overwrite, never trust the client's copy.
    let headers = request.headers_mut();
    if let Ok(value) = HeaderValue::from_str(tenant_id.as_str()) {
        headers.insert(TENANT_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&claims.sub) {
        headers.insert(USER_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&claims.roles.join(",")) {
        headers.insert(ROLE_HEADER, value);
    }

    debug!(tenant_id = %tenant_id, user_id = %claims.sub, "Request authenticated");

    request.extensions_mut().insert(RequestIdentity {
        tenant_id,
        user_id: claims.sub.clone(),
        roles: claims.roles.clone(),
    });

    next.run(request).await
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Per-tenant rate limiting. Authenticated requests draw from the tenant's
/// bucket; public paths draw from a per-address bucket.
pub async fn rate_limit_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let key = match request.extensions().get::<RequestIdentity>() {
        Some(identity) => format!("tenant:{}", identity.tenant_id),
        None => format!("addr:{}", client_address(&request)),
    };

    let policy = state
        .routes
        .resolve(&path)
        .and_then(|matched| matched.route.rate_limit);

    let decision = match state.rate_limiter.check(&key, policy).await {
        Ok(decision) => decision,
        Err(e) => {
            // A broken bucket store must not take the data plane down.
            warn!(error = %e, "Rate limiter unavailable, admitting request");
            return next.run(request).await;
        }
    };

    if !decision.allowed {
        debug!(key = %key, "Rate limit exceeded");
        return GatewayError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        }
        .into_response();
    }

    let remaining = decision.remaining;
    let mut response = next.run(request).await;
    if state.rate_limiter.enabled() {
        if let Ok(value) = remaining.to_string().parse() {
            response.headers_mut().insert("X-RateLimit-Remaining", value);
        }
    }
    response
}

fn client_address(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
