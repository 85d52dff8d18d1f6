// Pesa Wallet Server Binary
//
// Starts the wallet backend: database, event consumers and the REST API.

use pesa_wallet::{DatabaseConfig, WalletPlatform};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    tracing::info!("Starting Pesa Wallet server");

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let db_config = DatabaseConfig::default();

    tracing::info!("Database URL: {}", db_config.redacted_url());
    tracing::info!("Max database connections: {}", db_config.max_connections);

    tracing::info!("Initializing wallet platform...");
    let platform = WalletPlatform::new(db_config).await?;
    tracing::info!("Wallet platform initialized");

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    platform.start_api_server(&bind_addr).await?;

    platform.shutdown();

    Ok(())
}
