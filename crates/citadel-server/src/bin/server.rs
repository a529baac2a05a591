//! Citadel Server Binary

use anyhow::Result;
use citadel_common_config::Environment;
use citadel_server::{config::LoggingConfig, Server, ServerConfig};
use tracing::info;

#[cfg(feature = "tracing")]
fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(not(feature = "tracing"))]
fn init_tracing(_logging: &LoggingConfig) {}

#[tokio::main]
async fn main() -> Result<()> {
    Environment::init()?;
    let config = ServerConfig::from_env()?;
    init_tracing(&config.logging);

    info!("Starting Citadel Server v{}", env!("CARGO_PKG_VERSION"));

    let server = Server::new(config).await?;
    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}
