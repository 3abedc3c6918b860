//! Prometheus metrics endpoint

use crate::server::state::AppState;
use crate::utils::error::RelayError;
use actix_web::{HttpResponse, web};
use tracing::debug;

/// Metrics endpoint (Prometheus text format)
pub async fn metrics(state: web::Data<AppState>) -> Result<HttpResponse, RelayError> {
    debug!("Metrics requested");

    let body = state.metrics.render()?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(body))
}
