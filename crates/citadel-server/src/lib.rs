//! Citadel API Server
//!
//! HTTP front end for the tenant-isolated data platform.
//!
//! # Architecture
//!
//! - **Routes**: HTTP endpoint definitions
//! - **Handlers**: request processing against the request transaction
//! - **Middleware**: authentication, the tenant guard, the transactional
//!   tenant scope and access-session recording
//! - **Db**: pools, migrations and the tenant binding shared with background
//!   jobs
//!
//! Startup is strictly ordered: connect, migrate, provision row-level
//! security, then accept traffic.

#![warn(clippy::all)]

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use anyhow::{anyhow, Context};
use axum::Router;
use citadel_common_config::{DeploymentMode, Environment};
use citadel_policy::{PolicyCatalog, PolicyProvisioner, ProvisionReport};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server builder for constructing and running the API server.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Validate configuration, connect, migrate and provision.
    pub async fn new(config: ServerConfig) -> Result<Self, anyhow::Error> {
        if let Err(errors) = config::validate_config(&config) {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(anyhow!("Invalid configuration: {joined}"));
        }

        let state = AppState::new(&config).await?;

        if config.database.run_migrations {
            db::run_migrations(&state.admin_pool).await?;
        }

        let mode = Environment::deployment_mode()?;
        provision(&config, &state, mode).await?;

        Ok(Self { config, state })
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        routes::create_router(self.state.clone())
    }

    /// Run the server, binding to the configured address.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = self.addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        info!("Server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }

    /// Get the server's socket address.
    pub fn addr(&self) -> Result<SocketAddr, anyhow::Error> {
        self.config
            .socket_addr()
            .context("Invalid server host/port")
    }
}

/// Apply the policy catalog when the deployment mode (or an explicit
/// override) allows it. Any failure aborts startup.
pub async fn provision(
    config: &ServerConfig,
    state: &AppState,
    mode: DeploymentMode,
) -> Result<Option<ProvisionReport>, anyhow::Error> {
    if !config.provisioning.should_run(mode) {
        info!(%mode, "Skipping policy provisioning; security objects ship as migrations");
        return Ok(None);
    }

    let options = config.provisioning.options(&config.database);
    let report = PolicyProvisioner::new(state.admin_pool.clone(), PolicyCatalog::platform(), options)
        .run()
        .await
        .context("Policy provisioning failed")?;
    Ok(Some(report))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
