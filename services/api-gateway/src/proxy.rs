// Upstream forwarding

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::error::{GatewayError, GatewayResult};
use crate::server::GatewayState;

// Connection-scoped headers that must not be forwarded either way.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str())
}

/// Fallback handler: resolves the route table and forwards the mutated
/// request. All edge filters have already run by the time this executes.
pub async fn proxy_handler(State(state): State<GatewayState>, request: Request) -> Response {
    match forward(state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn forward(state: GatewayState, request: Request) -> GatewayResult<Response> {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    let (upstream, upstream_path, timeout) = {
        let matched = state.routes.resolve(&path).ok_or(GatewayError::RouteNotFound)?;
        (
            matched.route.upstream.clone(),
            matched.upstream_path,
            matched.route.timeout(),
        )
    };

    let target = match &query {
        Some(query) => format!("{}{}?{}", upstream, upstream_path, query),
        None => format!("{}{}", upstream, upstream_path),
    };

    let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
        .map_err(|_| GatewayError::RouteNotFound)?;
    let headers = request.headers().clone();

    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| GatewayError::Internal {
            message: format!("request body: {}", e),
        })?;

    debug!(target = %target, "Forwarding to upstream");

    let mut outbound = state.http_client.request(method, &target).timeout(timeout);
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name.as_str()) {
            outbound = outbound.header(name.as_str(), value.as_bytes());
        }
    }
    if !body.is_empty() {
        outbound = outbound.body(body);
    }

    let upstream_response = outbound.send().await.map_err(|e| {
        error!(target = %target, error = %e, "Upstream call failed");
        if e.is_timeout() {
            GatewayError::UpstreamTimeout { service: upstream.clone() }
        } else {
            GatewayError::UpstreamUnavailable { service: upstream.clone() }
        }
    })?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let response_headers = upstream_response.headers().clone();
    let bytes = upstream_response
        .bytes()
        .await
        .map_err(|_| GatewayError::UpstreamUnavailable { service: upstream })?;

    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        if !is_hop_by_hop(name.as_str()) {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
    }

    builder
        .body(Body::from(bytes))
        .map_err(|e| GatewayError::Internal {
            message: format!("response assembly: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("Host"));
        assert!(!is_hop_by_hop("tenant-id"));
        assert!(!is_hop_by_hop("authorization"));
        assert!(!is_hop_by_hop("correlation-id"));
    }
}
