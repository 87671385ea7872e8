// Gateway request metrics

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::server::GatewayState;

pub struct GatewayMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Requests handled by the gateway"),
            &["method", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "Request latency through the gateway",
            ),
            &["method"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
        })
    }

    pub fn observe(&self, method: &str, status: u16, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[method, &status.to_string()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

pub async fn metrics_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    state.metrics.observe(
        &method,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
