//! Ingress authentication middleware
//!
//! When auth is enabled the client must present exactly
//! `Authorization: Bearer <configured-token>`. Health and metrics routes
//! bypass the gate so probes keep working during credential rotation. The
//! expected token is read from the live core, so reloads rotate it without
//! a restart.

use crate::server::state::AppState;
use crate::utils::error::RelayError;
use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::{ResponseError, web};
use futures::future::{Ready, ready};
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

/// Routes exempt from authentication
fn is_public_route(path: &str) -> bool {
    path == "/health" || path.starts_with("/health/") || path == "/metrics"
}

/// Auth middleware for Actix-web
pub struct AuthGate;

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = AuthGateService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthGateService { service }))
    }
}

/// Service implementation for the auth gate
pub struct AuthGateService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !is_public_route(req.path()) {
            let auth = req
                .app_data::<web::Data<AppState>>()
                .map(|state| state.core.load().config.relay.auth.clone());

            if let Some(auth) = auth {
                if auth.enabled {
                    let presented = req
                        .headers()
                        .get(actix_web::http::header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok());
                    let expected = format!("Bearer {}", auth.token);
                    if presented != Some(expected.as_str()) {
                        warn!(
                            path = req.path(),
                            "Rejected request with missing or wrong token"
                        );
                        let response = RelayError::AuthRejected
                            .error_response()
                            .map_into_right_body();
                        return Box::pin(ready(Ok(req.into_response(response))));
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(|res| res.map_into_left_body()) })
    }
}
