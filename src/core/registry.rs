//! Endpoint registry
//!
//! Holds the endpoint set for one configuration generation and resolves
//! upstream credentials. Resolution walks endpoints in declaration order and
//! takes the first match within the endpoint's group; the walk happens once
//! at construction and is memoised per endpoint name.

use crate::config::models::EndpointConfig;
use crate::core::endpoint::Endpoint;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct ResolvedCredentials {
    token: Option<String>,
    api_key: Option<String>,
}

/// Endpoint registry for a single configuration generation
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: Vec<Arc<Endpoint>>,
    credentials: HashMap<String, ResolvedCredentials>,
    generation: u64,
}

impl EndpointRegistry {
    /// Build the registry from normalized endpoint declarations
    pub fn new(configs: &[EndpointConfig], global_timeout: Duration, generation: u64) -> Self {
        let endpoints: Vec<Arc<Endpoint>> = configs
            .iter()
            .map(|c| Arc::new(Endpoint::from_config(c, global_timeout)))
            .collect();

        let mut credentials = HashMap::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            credentials.insert(
                endpoint.name.clone(),
                ResolvedCredentials {
                    token: resolve_in_group(&endpoints, endpoint, |e| e.token.as_ref()),
                    api_key: resolve_in_group(&endpoints, endpoint, |e| e.api_key.as_ref()),
                },
            );
        }

        Self {
            endpoints,
            credentials,
            generation,
        }
    }

    /// All endpoints in declaration order
    pub fn all(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Look up an endpoint by name regardless of group state
    pub fn get(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Look up an endpoint by name, restricted to the given active group
    pub fn get_in_group(&self, name: &str, group: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints
            .iter()
            .find(|e| e.name == name && e.group == group)
    }

    /// Healthy members of the given group, in declaration order
    pub fn healthy_in_group(&self, group: &str) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .iter()
            .filter(|e| e.group == group && e.health.is_healthy())
            .cloned()
            .collect()
    }

    /// All members of the given group, in declaration order
    pub fn members_of(&self, group: &str) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .iter()
            .filter(|e| e.group == group)
            .cloned()
            .collect()
    }

    /// Resolve the bearer token for an endpoint
    ///
    /// Prefers the endpoint's own token, then the first endpoint in its
    /// group (declaration order) that defines one. Absence is not an error.
    pub fn resolve_token(&self, endpoint: &Endpoint) -> Option<&str> {
        self.credentials
            .get(&endpoint.name)
            .and_then(|c| c.token.as_deref())
    }

    /// Resolve the api-key header value for an endpoint
    pub fn resolve_api_key(&self, endpoint: &Endpoint) -> Option<&str> {
        self.credentials
            .get(&endpoint.name)
            .and_then(|c| c.api_key.as_deref())
    }

    /// Configuration generation this registry belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn resolve_in_group<'a, F>(
    endpoints: &'a [Arc<Endpoint>],
    target: &Endpoint,
    field: F,
) -> Option<String>
where
    F: Fn(&'a Endpoint) -> Option<&'a String>,
{
    if let Some(own) = field(endpoints.iter().find(|e| e.name == target.name)?) {
        return Some(own.clone());
    }
    endpoints
        .iter()
        .filter(|e| e.group == target.group)
        .find_map(|e| field(e))
        .cloned()
}
