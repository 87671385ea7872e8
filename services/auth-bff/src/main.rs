use anyhow::Result;

use auth_bff::config::AuthBffConfig;
use auth_bff::server::AuthBffServer;
use ldp_shared::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AuthBffConfig::from_env()?;
    init_logging(&config.logging);

    let server = AuthBffServer::new(config)?;
    server.run().await?;

    Ok(())
}
