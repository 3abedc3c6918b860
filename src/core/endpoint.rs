//! Endpoint model and its mutable health companion

use crate::config::models::EndpointConfig;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// A configured upstream endpoint
///
/// Everything except [`Endpoint::health`] is immutable for the lifetime of a
/// configuration generation; reloads replace endpoints wholesale.
#[derive(Debug)]
pub struct Endpoint {
    /// Unique name
    pub name: String,
    /// Upstream base URL
    pub url: String,
    /// Endpoint priority, lower preferred
    pub priority: u32,
    /// Failover group name
    pub group: String,
    /// Group priority, lower preferred
    pub group_priority: u32,
    /// Bearer token, if this endpoint declares one
    pub token: Option<String>,
    /// API-key header value, if this endpoint declares one
    pub api_key: Option<String>,
    /// Total deadline for buffered requests to this endpoint
    pub timeout: Duration,
    /// Extra headers merged into upstream requests
    pub headers: HashMap<String, String>,
    /// Mutable probe state
    pub health: EndpointHealth,
}

impl Endpoint {
    /// Build an endpoint from its normalized config declaration
    pub fn from_config(config: &EndpointConfig, global_timeout: Duration) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            priority: config.priority,
            group: config
                .group
                .clone()
                .unwrap_or_else(|| crate::config::models::DEFAULT_GROUP.to_string()),
            group_priority: config.group_priority.unwrap_or(0),
            token: config.token.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout.unwrap_or(global_timeout),
            headers: config.headers.clone().unwrap_or_default(),
            health: EndpointHealth::new(),
        }
    }
}

/// Mutable per-endpoint probe state
///
/// Starts optimistic: a fresh generation assumes every endpoint is healthy
/// until a probe proves otherwise.
#[derive(Debug)]
pub struct EndpointHealth {
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    last_check: RwLock<Option<DateTime<Utc>>>,
    response_time: RwLock<Option<Duration>>,
}

impl EndpointHealth {
    fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            last_check: RwLock::new(None),
            response_time: RwLock::new(None),
        }
    }

    /// Whether the last probe found the endpoint reachable
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Timestamp of the most recent probe
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        *self.last_check.read()
    }

    /// Latency observed by the most recent probe
    pub fn response_time(&self) -> Option<Duration> {
        *self.response_time.read()
    }

    /// Probe failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Record a probe outcome; returns true when the healthy flag flipped
    pub fn record_probe(&self, healthy: bool, latency: Duration) -> bool {
        *self.last_check.write() = Some(Utc::now());
        *self.response_time.write() = Some(latency);
        if healthy {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.healthy.swap(healthy, Ordering::Relaxed) != healthy
    }
}
