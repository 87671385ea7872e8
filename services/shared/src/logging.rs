// Logging setup shared by all service binaries

use tracing_subscriber::fmt::Layer as FmtLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = Registry::default().with(env_filter);

    match config.format.as_str() {
        "json" => registry
            .with(FmtLayer::new().json().with_current_span(true))
            .init(),
        "pretty" => registry.with(FmtLayer::new().pretty()).init(),
        _ => registry.with(FmtLayer::new()).init(),
    }

    tracing::info!(level = %config.level, format = %config.format, "Logging initialized");
}
