//! Configuration management for the relay
//!
//! This module handles loading, validation, and hot reloading of the relay
//! configuration file.

pub mod models;
pub mod watcher;

pub use models::*;
pub use watcher::ConfigSupervisor;

use crate::utils::error::{RelayError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Loaded and normalized configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The deserialized file contents, post-inheritance
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from file
    ///
    /// Applies the endpoint inheritance transform and, when given, the CLI
    /// priority override, then validates the result.
    pub async fn from_file<P: AsRef<Path>>(path: P, promote: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;

        let mut relay: RelayConfig = serde_yaml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)))?;

        apply_endpoint_inheritance(&mut relay.endpoints, relay.global_timeout);
        if let Some(name) = promote {
            apply_priority_override(&mut relay.endpoints, name)?;
            info!("Endpoint '{}' promoted to priority 1", name);
        }

        let config = Self { relay };
        config.validate()?;

        debug!(
            endpoints = config.relay.endpoints.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Get listener configuration
    pub fn server(&self) -> &ServerConfig {
        &self.relay.server
    }

    /// Get the endpoint declarations
    pub fn endpoints(&self) -> &[EndpointConfig] {
        &self.relay.endpoints
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        let relay = &self.relay;

        if relay.server.port == 0 {
            return Err(RelayError::Config("server.port must be non-zero".into()));
        }
        if relay.endpoints.is_empty() {
            return Err(RelayError::Config(
                "at least one endpoint must be configured".into(),
            ));
        }
        if relay.retry.max_attempts == 0 {
            return Err(RelayError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if relay.retry.multiplier < 1.0 {
            return Err(RelayError::Config(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if relay.retry.base_delay > relay.retry.max_delay {
            return Err(RelayError::Config(
                "retry.base_delay must not exceed retry.max_delay".into(),
            ));
        }
        if relay.auth.enabled && relay.auth.token.is_empty() {
            return Err(RelayError::Config(
                "auth.enabled requires a non-empty auth.token".into(),
            ));
        }
        if relay.proxy.enabled {
            relay.proxy.proxy_url()?;
        }

        let mut seen = std::collections::HashSet::new();
        for endpoint in &relay.endpoints {
            if endpoint.name.is_empty() {
                return Err(RelayError::Config("endpoint name must not be empty".into()));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(RelayError::Config(format!(
                    "Duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
            let parsed = url::Url::parse(&endpoint.url).map_err(|e| {
                RelayError::Config(format!("Endpoint '{}' has invalid URL: {}", endpoint.name, e))
            })?;
            match parsed.scheme() {
                "http" | "https" => {}
                scheme => {
                    return Err(RelayError::Config(format!(
                        "Endpoint '{}' uses unsupported URL scheme '{}'",
                        endpoint.name, scheme
                    )));
                }
            }
        }

        Ok(())
    }
}
