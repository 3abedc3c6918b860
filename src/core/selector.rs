//! Candidate ordering strategies
//!
//! Orders the active group's healthy endpoints for the retry driver. The
//! round-robin cursor lives here, inside the per-generation core, so a
//! config reload starts counting from zero again.

use crate::config::models::{StrategyConfig, StrategyType};
use crate::core::endpoint::Endpoint;
use crate::core::fast_test::FastTester;
use crate::core::registry::EndpointRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Strategy-based endpoint ordering
#[derive(Debug)]
pub struct EndpointSelector {
    strategy: StrategyType,
    rr_counter: AtomicUsize,
    tester: FastTester,
}

impl EndpointSelector {
    /// Build the selector (and its fast tester) from strategy settings
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            strategy: config.strategy_type,
            rr_counter: AtomicUsize::new(0),
            tester: FastTester::new(config),
        }
    }

    /// Active strategy
    pub fn strategy(&self) -> StrategyType {
        self.strategy
    }

    /// The fast tester owned by this selector
    pub fn tester(&self) -> &FastTester {
        &self.tester
    }

    /// Order candidates for one request
    ///
    /// `log` suppresses the ordering trace for silent re-entrant calls
    /// (the health prober and the fastest-strategy fallback both re-enter).
    pub async fn order(
        &self,
        client: &reqwest::Client,
        registry: &EndpointRegistry,
        mut candidates: Vec<Arc<Endpoint>>,
        log: bool,
    ) -> Vec<Arc<Endpoint>> {
        match self.strategy {
            StrategyType::Priority => {
                candidates.sort_by_key(|e| e.priority);
            }
            StrategyType::Fastest => {
                candidates = self.order_fastest(client, registry, candidates).await;
            }
            StrategyType::RoundRobin => {
                if !candidates.is_empty() {
                    let shift = self.rr_counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
                    candidates.rotate_left(shift);
                }
            }
        }

        if log {
            debug!(
                strategy = ?self.strategy,
                order = ?candidates.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
                "Candidates ordered"
            );
        }
        candidates
    }

    async fn order_fastest(
        &self,
        client: &reqwest::Client,
        registry: &EndpointRegistry,
        candidates: Vec<Arc<Endpoint>>,
    ) -> Vec<Arc<Endpoint>> {
        if self.tester.enabled() {
            let (outcomes, cache_used) = self.tester.probe_all(client, registry, &candidates).await;
            let mut successes: Vec<_> = outcomes.into_iter().filter(|o| o.success).collect();
            if !successes.is_empty() {
                successes.sort_by_key(|o| o.latency);
                debug!(cache_used, "Fastest order from fast-test latencies");
                return successes.into_iter().map(|o| o.endpoint).collect();
            }
            debug!("All fast tests failed, falling back to probe latency order");
        }
        order_by_probe_latency(candidates)
    }
}

/// Sort by the latency the health prober last observed; unknown sorts last
fn order_by_probe_latency(mut candidates: Vec<Arc<Endpoint>>) -> Vec<Arc<Endpoint>> {
    candidates.sort_by_key(|e| {
        e.health
            .response_time()
            .unwrap_or(Duration::from_secs(u64::MAX / 2))
    });
    candidates
}
