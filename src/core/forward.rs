//! Request forwarding: ingress inspection, header rewrite, buffered dispatch
//!
//! The buffered path replays the client body across retries through the
//! retry driver and copies the winning upstream response back wholesale.
//! The streaming path lives in [`crate::core::streaming`].

use crate::core::RelayCore;
use crate::core::endpoint::Endpoint;
use crate::core::retry::RetryDriver;
use crate::monitoring::metrics::ProxyMetrics;
use crate::utils::error::Result;
use crate::utils::net::join_upstream_url;
use actix_web::{HttpRequest, HttpResponse};
use bytes::Bytes;
use tracing::debug;

/// Headers never copied towards the upstream: authentication is rewritten
/// and the connection-scoped set is meaningless across the hop
const DROPPED_REQUEST_HEADERS: &[&str] = &["host", "authorization", "x-api-key"];

/// RFC 7230 hop-by-hop headers, stripped in both directions
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Header carrying the resolved api-key value upstream
const API_KEY_HEADER: &str = "x-api-key";

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn is_dropped_request_header(name: &str) -> bool {
    is_hop_by_hop(name)
        || DROPPED_REQUEST_HEADERS
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name))
        || name.eq_ignore_ascii_case("content-length")
}

/// Decide whether a request expects a streamed response
///
/// Any of: `Accept: text/event-stream`, `Cache-Control: no-cache`, a
/// `stream: true` header, or a `"stream": true` member in the JSON body.
/// The body scan is a byte-level heuristic, deliberately tolerant of
/// whitespace and ignorant of JSON structure.
pub fn wants_streaming(req: &HttpRequest, body: &[u8]) -> bool {
    let header_contains = |name: &str, needle: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains(needle))
    };

    header_contains("accept", "text/event-stream")
        || header_contains("cache-control", "no-cache")
        || req
            .headers()
            .get("stream")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
        || body_requests_stream(body)
}

/// Scan the body for `"stream"` followed by `:` and `true`
pub fn body_requests_stream(body: &[u8]) -> bool {
    const KEY: &[u8] = b"\"stream\"";
    let mut search_from = 0;
    while let Some(pos) = find(&body[search_from..], KEY) {
        let mut rest = &body[search_from + pos + KEY.len()..];
        while let [first, tail @ ..] = rest {
            if first.is_ascii_whitespace() {
                rest = tail;
            } else {
                break;
            }
        }
        if let Some(after_colon) = rest.strip_prefix(b":") {
            let mut value = after_colon;
            while let [first, tail @ ..] = value {
                if first.is_ascii_whitespace() {
                    value = tail;
                } else {
                    break;
                }
            }
            if value.starts_with(b"true") {
                return true;
            }
        }
        search_from += pos + KEY.len();
    }
    false
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Extract the client headers that survive the rewrite
///
/// Values that are not valid UTF-8 are skipped; Claude-style APIs do not
/// use binary header values.
pub fn client_headers(req: &HttpRequest) -> Vec<(String, String)> {
    req.headers()
        .iter()
        .filter(|(name, _)| !is_dropped_request_header(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Build the upstream request for one endpoint
///
/// Applies the full rewrite: surviving client headers, resolved bearer
/// token and api-key, endpoint extra headers (which win on conflict), the
/// per-endpoint timeout on buffered requests, and identity encoding on
/// streaming ones. reqwest derives `Host` from the target URL.
pub fn build_upstream_request(
    core: &RelayCore,
    endpoint: &Endpoint,
    method: &reqwest::Method,
    path_and_query: &str,
    headers: &[(String, String)],
    body: Bytes,
    streaming: bool,
) -> reqwest::RequestBuilder {
    let url = join_upstream_url(&endpoint.url, path_and_query);

    let mut header_map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_str(value),
        ) {
            header_map.insert(name, value);
        }
    }

    if let Some(token) = core.registry.resolve_token(endpoint) {
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token)) {
            header_map.insert(reqwest::header::AUTHORIZATION, value);
        }
    }
    if let Some(api_key) = core.registry.resolve_api_key(endpoint) {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(API_KEY_HEADER.as_bytes()),
            reqwest::header::HeaderValue::from_str(api_key),
        ) {
            header_map.insert(name, value);
        }
    }
    for (name, value) in &endpoint.headers {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_str(value),
        ) {
            header_map.insert(name, value);
        }
    }
    if streaming {
        header_map.insert(
            reqwest::header::ACCEPT_ENCODING,
            reqwest::header::HeaderValue::from_static("identity"),
        );
    }

    let mut request = core
        .client
        .request(method.clone(), url)
        .headers(header_map)
        .body(body);
    if !streaming {
        request = request.timeout(endpoint.timeout);
    }
    request
}

/// Forward a buffered (non-streaming) request
pub async fn forward_regular(
    core: &RelayCore,
    metrics: &ProxyMetrics,
    req: &HttpRequest,
    body: Bytes,
    request_id: &str,
) -> Result<HttpResponse> {
    let candidates = core.candidates(true).await?;
    let headers = client_headers(req);
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| crate::utils::error::RelayError::Internal("invalid method".into()))?;
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let driver = RetryDriver::new(&core.config.relay.retry, &core.groups, metrics);
    let upstream = driver
        .run(&candidates, request_id, |endpoint| {
            metrics.record_dispatch(&endpoint.name);
            let request = build_upstream_request(
                core,
                &endpoint,
                &method,
                path_and_query,
                &headers,
                body.clone(),
                false,
            );
            debug!(request_id, endpoint = %endpoint.name, "Dispatching upstream");
            async move { request.send().await }
        })
        .await?;

    copy_response(upstream).await
}

/// Copy the upstream response back to the client, buffered
async fn copy_response(upstream: reqwest::Response) -> Result<HttpResponse> {
    let status = actix_web::http::StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);

    let mut builder = HttpResponse::build(status);
    for (name, value) in upstream.headers() {
        if is_hop_by_hop(name.as_str()) || name == reqwest::header::CONTENT_LENGTH {
            continue;
        }
        builder.append_header((name.as_str(), value.as_bytes()));
    }

    let body = upstream.bytes().await?;
    Ok(builder.body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_body_stream_flag_detection() {
        assert!(body_requests_stream(br#"{"model":"m","stream":true}"#));
        assert!(body_requests_stream(br#"{ "stream" :  true }"#));
        assert!(!body_requests_stream(br#"{"stream":false}"#));
        assert!(!body_requests_stream(br#"{"streaming":true}"#));
        assert!(!body_requests_stream(br#"{"downstream":"true"}"#));
        assert!(body_requests_stream(
            br#"{"stream":"no","stream"
                : true}"#
        ));
    }

    #[test]
    fn test_streaming_detected_from_headers() {
        let req = TestRequest::default()
            .insert_header(("accept", "text/event-stream"))
            .to_http_request();
        assert!(wants_streaming(&req, b"{}"));

        let req = TestRequest::default()
            .insert_header(("cache-control", "no-cache"))
            .to_http_request();
        assert!(wants_streaming(&req, b"{}"));

        let req = TestRequest::default()
            .insert_header(("stream", "true"))
            .to_http_request();
        assert!(wants_streaming(&req, b"{}"));

        let req = TestRequest::default().to_http_request();
        assert!(!wants_streaming(&req, b"{}"));
    }

    #[test]
    fn test_client_headers_drop_sensitive_and_hop_by_hop() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer client-secret"))
            .insert_header(("X-API-Key", "client-key"))
            .insert_header(("Connection", "keep-alive"))
            .insert_header(("Transfer-Encoding", "chunked"))
            .insert_header(("content-type", "application/json"))
            .insert_header(("anthropic-version", "2023-06-01"))
            .to_http_request();

        let headers = client_headers(&req);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"content-type"));
        assert!(names.contains(&"anthropic-version"));
        assert!(!names.contains(&"authorization"));
        assert!(!names.contains(&"x-api-key"));
        assert!(!names.contains(&"connection"));
        assert!(!names.contains(&"transfer-encoding"));
    }
}
