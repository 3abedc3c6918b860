//! Application state shared across HTTP handlers

use crate::core::RelayCore;
use crate::monitoring::metrics::ProxyMetrics;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// HTTP server state shared across handlers
///
/// The routing core is held behind an [`ArcSwap`] so the config supervisor
/// can replace it atomically. Handlers load a snapshot at ingress and keep
/// it for the whole request: in-flight requests always complete against the
/// generation they started with. Metrics outlive reloads.
#[derive(Clone)]
pub struct AppState {
    /// Live routing core, replaced wholesale on config reload
    pub core: Arc<ArcSwap<RelayCore>>,
    /// Request metrics
    pub metrics: Arc<ProxyMetrics>,
}

impl AppState {
    /// Create state around an initial core
    pub fn new(core: RelayCore, metrics: Arc<ProxyMetrics>) -> Self {
        Self {
            core: Arc::new(ArcSwap::from_pointee(core)),
            metrics,
        }
    }
}
