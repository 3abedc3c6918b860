//! Prometheus metrics
//!
//! Counters and gauges survive config reloads; only the routing core is
//! generation-scoped. Average and P95 response times are computed at scrape
//! time from a bounded latency window.

use crate::utils::error::{RelayError, Result};
use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Latency samples kept for the avg/P95 computation
const LATENCY_WINDOW: usize = 1024;

/// Request metrics shared across handlers and the retry driver
pub struct ProxyMetrics {
    registry: Registry,
    requests_total: IntCounter,
    requests_success: IntCounter,
    requests_failed: IntCounter,
    endpoint_requests: IntCounterVec,
    endpoint_retries: IntCounterVec,
    active_connections: IntGauge,
    response_time_avg_ms: Gauge,
    response_time_p95_ms: Gauge,
    latencies: Mutex<VecDeque<f64>>,
}

impl ProxyMetrics {
    /// Create and register all metric families
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::new(
            "relay_requests_total",
            "Total client requests accepted by the relay",
        )
        .map_err(metric_error)?;
        let requests_success = IntCounter::new(
            "relay_requests_success_total",
            "Requests answered with an upstream response",
        )
        .map_err(metric_error)?;
        let requests_failed = IntCounter::new(
            "relay_requests_failed_total",
            "Requests that ended in a relay-level error",
        )
        .map_err(metric_error)?;
        let endpoint_requests = IntCounterVec::new(
            Opts::new(
                "relay_endpoint_requests_total",
                "Upstream dispatches per endpoint",
            ),
            &["endpoint"],
        )
        .map_err(metric_error)?;
        let endpoint_retries = IntCounterVec::new(
            Opts::new(
                "relay_endpoint_retries_total",
                "Retry attempts per endpoint",
            ),
            &["endpoint"],
        )
        .map_err(metric_error)?;
        let active_connections = IntGauge::new(
            "relay_active_connections",
            "Client requests currently in flight",
        )
        .map_err(metric_error)?;
        let response_time_avg_ms = Gauge::new(
            "relay_response_time_avg_ms",
            "Average response time over the recent window",
        )
        .map_err(metric_error)?;
        let response_time_p95_ms = Gauge::new(
            "relay_response_time_p95_ms",
            "95th percentile response time over the recent window",
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(requests_success.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(requests_failed.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(endpoint_requests.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(endpoint_retries.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(active_connections.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(response_time_avg_ms.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(response_time_p95_ms.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            requests_total,
            requests_success,
            requests_failed,
            endpoint_requests,
            endpoint_retries,
            active_connections,
            response_time_avg_ms,
            response_time_p95_ms,
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        })
    }

    /// Count one accepted client request and guard the active gauge
    pub fn begin_request(self: &Arc<Self>) -> ConnectionGuard {
        self.requests_total.inc();
        self.active_connections.inc();
        ConnectionGuard {
            metrics: self.clone(),
        }
    }

    /// Count an upstream dispatch to an endpoint
    pub fn record_dispatch(&self, endpoint: &str) {
        self.endpoint_requests.with_label_values(&[endpoint]).inc();
    }

    /// Count a retry attempt against an endpoint
    pub fn record_retry(&self, endpoint: &str) {
        self.endpoint_retries.with_label_values(&[endpoint]).inc();
    }

    /// Record the final outcome and latency of a request
    pub fn record_outcome(&self, success: bool, elapsed: Duration) {
        if success {
            self.requests_success.inc();
        } else {
            self.requests_failed.inc();
        }

        let mut latencies = self.latencies.lock();
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(elapsed.as_secs_f64() * 1_000.0);
    }

    /// Render the Prometheus text exposition
    pub fn render(&self) -> Result<String> {
        {
            let latencies = self.latencies.lock();
            let (avg, p95) = summarize(&latencies);
            self.response_time_avg_ms.set(avg);
            self.response_time_p95_ms.set(p95);
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer)
            .map_err(|e| RelayError::Internal(format!("metrics encoding: {}", e)))
    }
}

/// Decrements the active-connection gauge when a request ends
pub struct ConnectionGuard {
    metrics: Arc<ProxyMetrics>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.metrics.active_connections.dec();
    }
}

fn summarize(window: &VecDeque<f64>) -> (f64, f64) {
    if window.is_empty() {
        return (0.0, 0.0);
    }
    let avg = window.iter().sum::<f64>() / window.len() as f64;

    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
    let p95 = sorted[rank.saturating_sub(1).min(sorted.len() - 1)];

    (avg, p95)
}

fn metric_error(e: impl std::fmt::Display) -> RelayError {
    RelayError::Internal(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_empty_window() {
        assert_eq!(summarize(&VecDeque::new()), (0.0, 0.0));
    }

    #[test]
    fn test_summarize_percentile() {
        let window: VecDeque<f64> = (1..=100).map(|n| n as f64).collect();
        let (avg, p95) = summarize(&window);
        assert!((avg - 50.5).abs() < f64::EPSILON);
        assert!((p95 - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_render_contains_counters() {
        let metrics = Arc::new(ProxyMetrics::new().unwrap());
        {
            let _guard = metrics.begin_request();
            metrics.record_dispatch("main");
            metrics.record_retry("main");
            metrics.record_outcome(true, Duration::from_millis(12));
        }

        let text = metrics.render().unwrap();
        assert!(text.contains("relay_requests_total 1"));
        assert!(text.contains("relay_endpoint_retries_total"));
        assert!(text.contains("relay_active_connections 0"));
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = ProxyMetrics::new().unwrap();
        for _ in 0..(LATENCY_WINDOW + 10) {
            metrics.record_outcome(true, Duration::from_millis(1));
        }
        assert_eq!(metrics.latencies.lock().len(), LATENCY_WINDOW);
    }
}
