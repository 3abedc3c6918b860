//! Catch-all proxy handler
//!
//! Every method and path not claimed by a built-in route lands here. The
//! body is buffered up front (retries need to replay it; actix enforces the
//! configured size cap with a 413), then the request goes down either the
//! buffered or the streaming path.

use crate::core::{forward, streaming};
use crate::server::state::AppState;
use crate::utils::error::{RelayError, Result};
use actix_web::{HttpRequest, HttpResponse, web};
use std::time::Instant;
use tracing::{debug, error};

/// Forward one client request to the routing core
pub async fn forward_request(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let request_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    let _guard = state.metrics.begin_request();

    // One snapshot per request: a reload mid-flight does not affect us
    let core = state.core.load_full();
    let started = Instant::now();

    let is_streaming = forward::wants_streaming(&req, &body);
    debug!(
        request_id = %request_id,
        method = %req.method(),
        path = req.path(),
        streaming = is_streaming,
        generation = core.generation(),
        "Inbound request"
    );

    let result = if is_streaming {
        streaming::forward_streaming(&core, &state.metrics, &req, body, &request_id).await
    } else {
        forward::forward_regular(&core, &state.metrics, &req, body, &request_id).await
    };

    match result {
        Ok(response) => {
            state.metrics.record_outcome(true, started.elapsed());
            Ok(response)
        }
        Err(e) => {
            state.metrics.record_outcome(false, started.elapsed());
            match &e {
                RelayError::Cancelled => {}
                _ => error!(request_id = %request_id, error = %e, "Request failed"),
            }
            Err(e)
        }
    }
}
