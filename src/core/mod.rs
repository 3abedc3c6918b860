//! Routing and forwarding core
//!
//! Everything in this module is scoped to one configuration generation and
//! replaced wholesale by the config supervisor: the endpoint registry, the
//! group state machine, the selector (with its round-robin cursor and fast
//! tester) and the upstream HTTP client.

pub mod endpoint;
pub mod forward;
pub mod group;
pub mod registry;
pub mod retry;
pub mod selector;
pub mod streaming;
pub mod usage;

#[cfg(test)]
mod tests;

pub use endpoint::Endpoint;
pub use group::{GroupManager, GroupSnapshot};
pub use registry::EndpointRegistry;
pub use retry::RetryDriver;
pub use selector::EndpointSelector;

use crate::config::Config;
use crate::utils::error::{RelayError, Result};
use std::sync::Arc;
use tracing::info;

/// The per-generation routing core
#[derive(Debug)]
pub struct RelayCore {
    /// The configuration this core was built from
    pub config: Arc<Config>,
    /// Endpoint set and credential resolution
    pub registry: EndpointRegistry,
    /// Group cooldown state
    pub groups: GroupManager,
    /// Candidate ordering
    pub selector: EndpointSelector,
    /// Upstream HTTP client (re-created with the core so proxy changes
    /// drain the old connection pool)
    pub client: reqwest::Client,
}

impl RelayCore {
    /// Assemble a core from a validated configuration
    pub fn from_config(config: Arc<Config>, generation: u64) -> Result<Self> {
        let relay = &config.relay;
        let registry =
            EndpointRegistry::new(&relay.endpoints, relay.global_timeout, generation);
        let groups = GroupManager::new(
            registry
                .all()
                .iter()
                .map(|e| (e.group.clone(), e.group_priority, e.name.clone())),
            relay.group.cooldown,
            relay.group.max_retries,
        );
        let selector = EndpointSelector::new(&relay.strategy);
        let client = crate::utils::net::build_upstream_client(&relay.proxy)?;

        info!(
            generation,
            endpoints = registry.all().len(),
            strategy = ?selector.strategy(),
            "Routing core assembled"
        );

        Ok(Self {
            config,
            registry,
            groups,
            selector,
            client,
        })
    }

    /// Configuration generation this core serves
    pub fn generation(&self) -> u64 {
        self.registry.generation()
    }

    /// Ordered candidate list for one request
    ///
    /// Selects the active group, filters to healthy members and applies the
    /// ordering strategy. Fails fast when every group is cooling down or the
    /// active group has no healthy endpoint.
    pub async fn candidates(&self, log: bool) -> Result<Vec<Arc<Endpoint>>> {
        let group = self.groups.select_active().ok_or_else(|| {
            RelayError::NoHealthyEndpoints("every group is in cooldown".into())
        })?;

        let healthy = self.registry.healthy_in_group(&group);
        if healthy.is_empty() {
            return Err(RelayError::NoHealthyEndpoints(format!(
                "no healthy endpoints in active group '{}'",
                group
            )));
        }

        Ok(self
            .selector
            .order(&self.client, &self.registry, healthy, log)
            .await)
    }
}
