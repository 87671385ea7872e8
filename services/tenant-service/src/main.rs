use anyhow::Result;

use ldp_shared::logging::init_logging;
use tenant_service::config::TenantServiceConfig;
use tenant_service::server::TenantServiceServer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = TenantServiceConfig::from_env()?;
    init_logging(&config.logging);

    let server = TenantServiceServer::new(config).await?;
    server.run().await?;

    Ok(())
}
