//! Health check endpoints

use crate::server::state::AppState;
use actix_web::{HttpResponse, Result as ActixResult, web};
use std::borrow::Cow;
use tracing::debug;

/// Basic health check endpoint
///
/// Reports how many endpoints the last probe round found healthy. Used by
/// load balancers and the terminal dashboard.
pub async fn health_check(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    debug!("Health check requested");

    let core = state.core.load();
    let total = core.registry.all().len();
    let healthy = core
        .registry
        .all()
        .iter()
        .filter(|e| e.health.is_healthy())
        .count();

    let status = HealthStatus {
        status: if healthy == total && total > 0 {
            Cow::Borrowed("healthy")
        } else {
            Cow::Borrowed("degraded")
        },
        healthy_endpoints: healthy,
        total_endpoints: total,
    };

    Ok(HttpResponse::Ok().json(status))
}

/// Detailed health check endpoint
///
/// Per-endpoint probe state plus group cooldown visibility.
pub async fn detailed_health_check(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    debug!("Detailed health check requested");

    let core = state.core.load();
    let endpoints: Vec<EndpointHealthDetail> = core
        .registry
        .all()
        .iter()
        .map(|e| EndpointHealthDetail {
            name: e.name.clone(),
            url: e.url.clone(),
            healthy: e.health.is_healthy(),
            group: e.group.clone(),
            priority: e.priority,
            last_check: e.health.last_check(),
            response_time_ms: e.health.response_time().map(|d| d.as_millis() as u64),
        })
        .collect();

    let groups: Vec<GroupHealthDetail> = core
        .groups
        .snapshot()
        .into_iter()
        .map(|g| GroupHealthDetail {
            name: g.name,
            priority: g.priority,
            in_cooldown: g.cooldown_remaining.is_some(),
            cooldown_remaining_ms: g.cooldown_remaining.map(|d| d.as_millis() as u64),
            retry_count: g.retry_count,
        })
        .collect();

    Ok(HttpResponse::Ok().json(DetailedHealthStatus {
        generation: core.generation(),
        endpoints,
        groups,
    }))
}

/// Basic health status
#[derive(Debug, Clone, serde::Serialize)]
struct HealthStatus {
    status: Cow<'static, str>,
    healthy_endpoints: usize,
    total_endpoints: usize,
}

/// Detailed health status
#[derive(Debug, Clone, serde::Serialize)]
struct DetailedHealthStatus {
    generation: u64,
    endpoints: Vec<EndpointHealthDetail>,
    groups: Vec<GroupHealthDetail>,
}

/// Individual endpoint health
#[derive(Debug, Clone, serde::Serialize)]
struct EndpointHealthDetail {
    name: String,
    url: String,
    healthy: bool,
    group: String,
    priority: u32,
    last_check: Option<chrono::DateTime<chrono::Utc>>,
    response_time_ms: Option<u64>,
}

/// Group cooldown state
#[derive(Debug, Clone, serde::Serialize)]
struct GroupHealthDetail {
    name: String,
    priority: u32,
    in_cooldown: bool,
    cooldown_remaining_ms: Option<u64>,
    retry_count: u32,
}
