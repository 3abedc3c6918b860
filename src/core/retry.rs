//! Per-request retry and cross-endpoint failover
//!
//! Drives an upstream operation across the ordered candidate list: serial
//! attempts with capped exponential backoff inside each endpoint, advance to
//! the next candidate on exhaustion, group bookkeeping when a whole group
//! bucket has been burned through.

use crate::config::models::RetryConfig;
use crate::core::endpoint::Endpoint;
use crate::core::group::GroupManager;
use crate::monitoring::metrics::ProxyMetrics;
use crate::utils::error::{RelayError, Result};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How an upstream status steers the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx/3xx: hand the response to the caller and credit the group
    Success,
    /// Request-level fault (401/403/404, other 4xx): hand back as-is,
    /// no retry, no group debit
    Terminal,
    /// Worth another attempt (400, 429, 5xx)
    Retryable,
}

/// Classify an upstream status
///
/// 400 counts as transient upstream malformation and 429 as rate limiting,
/// both retryable; auth/permission/not-found failures are request-level
/// faults that further retries cannot fix. Anything unrecognised is
/// conservatively terminal.
pub fn classify_status(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        200..=399 => StatusClass::Success,
        400 | 429 => StatusClass::Retryable,
        401 | 403 | 404 => StatusClass::Terminal,
        402..=499 => StatusClass::Terminal,
        500..=599 => StatusClass::Retryable,
        _ => StatusClass::Terminal,
    }
}

/// Backoff before retry number `attempt` (1-based)
///
/// `min(base_delay * multiplier^(attempt-1), max_delay)`, so the first retry
/// waits exactly `base_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = config.multiplier.powi(attempt.saturating_sub(1) as i32);
    let delay = config.base_delay.mul_f64(factor);
    delay.min(config.max_delay)
}

/// Parse a numeric `Retry-After` header, if present
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Retry/failover driver for one configuration generation
pub struct RetryDriver<'a> {
    config: &'a RetryConfig,
    groups: &'a GroupManager,
    metrics: &'a ProxyMetrics,
}

impl<'a> RetryDriver<'a> {
    /// Assemble a driver over the generation's group state and metrics
    pub fn new(
        config: &'a RetryConfig,
        groups: &'a GroupManager,
        metrics: &'a ProxyMetrics,
    ) -> Self {
        Self {
            config,
            groups,
            metrics,
        }
    }

    /// Drive `op` across the candidates until a non-retryable outcome
    ///
    /// Returns the upstream response for both success and terminal statuses;
    /// the caller owns body closure. Candidate exhaustion surfaces as
    /// [`RelayError::AllEndpointsFailed`] carrying the last per-endpoint
    /// failure.
    pub async fn run<F, Fut>(
        &self,
        candidates: &[Arc<Endpoint>],
        request_id: &str,
        op: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        if candidates.is_empty() {
            return Err(RelayError::NoHealthyEndpoints(
                "candidate list is empty".into(),
            ));
        }

        let mut tried_per_group: HashMap<&str, usize> = HashMap::new();
        let mut last_error = String::from("no attempt made");

        for (index, endpoint) in candidates.iter().enumerate() {
            for attempt in 1..=self.config.max_attempts {
                match op(endpoint.clone()).await {
                    Err(transport) => {
                        last_error = format!("{}: {}", endpoint.name, transport);
                        warn!(
                            request_id,
                            endpoint = %endpoint.name,
                            attempt,
                            error = %transport,
                            "Upstream transport error"
                        );
                        if attempt < self.config.max_attempts {
                            self.metrics.record_retry(&endpoint.name);
                            tokio::time::sleep(backoff_delay(self.config, attempt)).await;
                        }
                    }
                    Ok(response) => match classify_status(response.status()) {
                        StatusClass::Success => {
                            self.groups.mark_succeeded(&endpoint.group);
                            return Ok(response);
                        }
                        StatusClass::Terminal => {
                            debug!(
                                request_id,
                                endpoint = %endpoint.name,
                                status = response.status().as_u16(),
                                "Non-retryable upstream status, passing through"
                            );
                            return Ok(response);
                        }
                        StatusClass::Retryable => {
                            let status = response.status();
                            let server_delay = retry_after(response.headers());
                            drop(response);
                            last_error = format!("{}: status {}", endpoint.name, status.as_u16());
                            warn!(
                                request_id,
                                endpoint = %endpoint.name,
                                attempt,
                                status = status.as_u16(),
                                "Retryable upstream status"
                            );
                            if attempt < self.config.max_attempts {
                                self.metrics.record_retry(&endpoint.name);
                                let mut delay = backoff_delay(self.config, attempt);
                                if let Some(server_delay) = server_delay {
                                    delay = delay.max(server_delay).min(self.config.max_delay);
                                }
                                tokio::time::sleep(delay).await;
                            }
                        }
                    },
                }
            }

            // Endpoint exhausted; debit the group once its last candidate
            // in this request has been burned through
            let tried = tried_per_group.entry(endpoint.group.as_str()).or_insert(0);
            *tried += 1;
            let last_of_group = !candidates[index + 1..]
                .iter()
                .any(|e| e.group == endpoint.group);
            if last_of_group {
                let member_count = self.groups.members_of(&endpoint.group).len();
                self.groups
                    .mark_failed(&endpoint.group, *tried >= member_count);
            }
        }

        Err(RelayError::AllEndpointsFailed { last_error })
    }
}
