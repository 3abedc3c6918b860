//! Periodic liveness probing of active-group endpoints
//!
//! A single background task. Each tick loads the current core snapshot, so
//! a config reload re-plumbs the prober without restarting it. Endpoints in
//! cooldown groups are not probed; cooldown expiry makes the group active
//! again and therefore eligible on the next tick.

use crate::core::RelayCore;
use crate::core::fast_test::probe_reachable;
use crate::utils::net::join_upstream_url;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Background health prober
pub struct HealthProber {
    core: Arc<ArcSwap<RelayCore>>,
}

impl HealthProber {
    /// Bind the prober to the live core handle
    pub fn new(core: Arc<ArcSwap<RelayCore>>) -> Self {
        Self { core }
    }

    /// Spawn the probe loop
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let core = self.core.load_full();
                let interval = core.config.relay.health.check_interval;
                probe_active_group(&core).await;
                tokio::time::sleep(interval).await;
            }
        })
    }
}

/// Probe every member of the currently-active group once
///
/// Unhealthy members are probed too; that is how they recover.
pub async fn probe_active_group(core: &RelayCore) {
    let Some(group) = core.groups.select_active() else {
        debug!("All groups cooling down, skipping probe round");
        return;
    };

    let health = &core.config.relay.health;
    let members = core.registry.members_of(&group);
    let probes = members.iter().map(|endpoint| {
        let url = join_upstream_url(&endpoint.url, &health.health_path);
        let token = core.registry.resolve_token(endpoint).map(str::to_string);
        let client = core.client.clone();
        let timeout = health.timeout;
        let endpoint = endpoint.clone();
        async move {
            let started = Instant::now();
            let mut request = client.get(&url).timeout(timeout);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }

            let (healthy, detail) = match request.send().await {
                Ok(response) => (
                    probe_reachable(response.status()),
                    format!("status {}", response.status().as_u16()),
                ),
                Err(e) => (false, e.to_string()),
            };

            let edge = endpoint.health.record_probe(healthy, started.elapsed());
            if edge {
                if healthy {
                    info!(endpoint = %endpoint.name, %detail, "Endpoint recovered");
                } else {
                    warn!(endpoint = %endpoint.name, %detail, "Endpoint became unhealthy");
                }
            }
        }
    });

    futures::future::join_all(probes).await;
}
