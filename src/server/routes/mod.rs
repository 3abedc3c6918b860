//! Built-in routes and the catch-all forwarder

pub mod forward;
pub mod health;
pub mod metrics;

use actix_web::web;

/// Configure the built-in (auth-bypassed) routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route("", web::get().to(health::health_check))
            .route("/detailed", web::get().to(health::detailed_health_check)),
    )
    .route("/metrics", web::get().to(metrics::metrics));
}
