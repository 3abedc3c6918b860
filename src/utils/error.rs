//! Error types for the relay

use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Result type alias for the relay
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No endpoint in the active group is healthy, or every group is cooling down
    #[error("No healthy endpoints available: {0}")]
    NoHealthyEndpoints(String),

    /// Network failure reaching an upstream
    #[error("Upstream transport error: {0}")]
    UpstreamTransport(#[from] reqwest::Error),

    /// Upstream answered with a status the retry loop could not absorb
    ///
    /// Taxonomy placeholder: in the current wiring non-retryable statuses
    /// are passed through as responses and never surface as this error.
    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    /// Every candidate endpoint was exhausted
    #[error("All endpoints failed, last error: {last_error}")]
    AllEndpointsFailed {
        /// Description of the final per-endpoint failure
        last_error: String,
    },

    /// Client went away mid-request
    #[error("Request cancelled by client")]
    Cancelled,

    /// Ingress body exceeded the configured cap
    ///
    /// Taxonomy placeholder: the cap is enforced by the payload config at
    /// extraction time, which answers 413 before a handler runs.
    #[error("Request body too large")]
    BodyTooLarge,

    /// Stream aborted after bytes already reached the client
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Ingress bearer token missing or wrong
    #[error("Authentication rejected")]
    AuthRejected,

    /// Internal errors that do not fit elsewhere
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for RelayError {
    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code) = match self {
            RelayError::Config(_) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
            ),
            RelayError::NoHealthyEndpoints(_) => (
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                "NO_HEALTHY_ENDPOINTS",
            ),
            RelayError::UpstreamTransport(_) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "UPSTREAM_TRANSPORT_ERROR",
            ),
            RelayError::UpstreamStatus(code) => (
                actix_web::http::StatusCode::from_u16(*code)
                    .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY),
                "UPSTREAM_STATUS",
            ),
            RelayError::AllEndpointsFailed { .. } => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "ALL_ENDPOINTS_FAILED",
            ),
            RelayError::BodyTooLarge => (
                actix_web::http::StatusCode::PAYLOAD_TOO_LARGE,
                "REQUEST_TOO_LARGE",
            ),
            RelayError::AuthRejected => (
                actix_web::http::StatusCode::UNAUTHORIZED,
                "AUTH_REJECTED",
            ),
            RelayError::Cancelled | RelayError::StreamInterrupted(_) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "STREAM_INTERRUPTED",
            ),
            _ => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: error_code.to_string(),
                message: self.to_string(),
                timestamp: chrono::Utc::now().timestamp(),
            },
        };

        HttpResponse::build(status_code).json(body)
    }
}

/// Standard error response format
#[derive(serde::Serialize)]
pub struct ErrorResponse {
    /// Wrapped error detail
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(serde::Serialize)]
pub struct ErrorDetail {
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Unix timestamp of the failure
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_healthy_endpoints_maps_to_503() {
        let err = RelayError::NoHealthyEndpoints("all groups cooling down".into());
        let resp = err.error_response();
        assert_eq!(resp.status().as_u16(), 503);
    }

    #[test]
    fn test_all_endpoints_failed_maps_to_502() {
        let err = RelayError::AllEndpointsFailed {
            last_error: "status 500".into(),
        };
        let resp = err.error_response();
        assert_eq!(resp.status().as_u16(), 502);
    }

    #[test]
    fn test_body_too_large_maps_to_413() {
        let resp = RelayError::BodyTooLarge.error_response();
        assert_eq!(resp.status().as_u16(), 413);
    }

    #[test]
    fn test_auth_rejected_maps_to_401() {
        let resp = RelayError::AuthRejected.error_response();
        assert_eq!(resp.status().as_u16(), 401);
    }
}
