//! Citadel policy provisioning binary.

use anyhow::Result;
use citadel_common_config::Environment;
use citadel_policy::cli::PolicyCli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Environment::init()?;
    PolicyCli::parse().run().await
}
