//! Server assembly and the run_server entry point
//!
//! Wires config → routing core → background tasks → listener. The health
//! prober and the config supervisor both hold the same live core handle the
//! handlers read from, so a reload re-plumbs everything at once.

use crate::config::{Config, ConfigSupervisor};
use crate::core::RelayCore;
use crate::health::HealthProber;
use crate::monitoring::metrics::ProxyMetrics;
use crate::server::server::RelayServer;
use crate::server::state::AppState;
use crate::utils::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// CLI-provided run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Path to the YAML config file
    pub config_path: PathBuf,
    /// Endpoint to promote to priority 1, if any
    pub promote: Option<String>,
}

/// Run the relay with the given options
pub async fn run_server(options: RunOptions) -> Result<()> {
    info!(
        "Starting claude-relay v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
    );

    let config = Config::from_file(&options.config_path, options.promote.as_deref()).await?;
    let server_config = config.server().clone();

    let metrics = Arc::new(ProxyMetrics::new()?);
    let core = RelayCore::from_config(Arc::new(config), 1)?;
    let state = AppState::new(core, metrics);

    HealthProber::new(state.core.clone()).spawn();

    let supervisor = Arc::new(ConfigSupervisor::new(
        &options.config_path,
        options.promote.clone(),
        state.core.clone(),
        1,
    ));
    supervisor.on_reload(Arc::new(|core| {
        info!(
            generation = core.generation(),
            endpoints = core.registry.all().len(),
            "Relay re-plumbed onto new configuration"
        );
    }));
    Arc::clone(&supervisor).spawn()?;

    info!(
        "Forwarding on http://{}:{} (built-ins: /health, /health/detailed, /metrics)",
        server_config.host, server_config.port
    );

    RelayServer::new(server_config, state).start().await
}
