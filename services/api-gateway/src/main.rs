use anyhow::Result;

use api_gateway::config::GatewayConfig;
use api_gateway::server::GatewayServer;
use ldp_shared::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = GatewayConfig::from_env()?;
    init_logging(&config.logging);

    let server = GatewayServer::new(config).await?;
    server.run().await?;

    Ok(())
}
