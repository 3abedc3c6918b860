//! Streaming dispatch
//!
//! Streaming bypasses the retry driver: once a single upstream byte has
//! reached the client the relay cannot switch endpoints, so candidates are
//! iterated manually and only pre-first-byte failures advance the list.
//! The body relay flushes on every newline and at a 512-byte ceiling, emits
//! heartbeat comments while the upstream is quiet, and aborts the stream
//! after the configured idle deadline.

use crate::config::models::StreamingConfig;
use crate::core::RelayCore;
use crate::core::forward::{build_upstream_request, client_headers};
use crate::core::usage::UsageScanner;
use crate::monitoring::metrics::ProxyMetrics;
use crate::utils::error::{RelayError, Result};
use actix_web::{HttpRequest, HttpResponse};
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Flush ceiling for relayed chunks
const MAX_FLUSH_BLOCK: usize = 512;

/// Hop-by-hop headers stripped from the upstream response
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

/// Forward a streaming request
///
/// Tries candidates in order until one answers with a non-error status,
/// then relays its body byte-for-byte. After the first relayed byte an
/// upstream failure truncates the client stream; no further candidates are
/// tried. Group state is driven exactly as on the buffered path: success
/// credits the group, and burning through a group's last candidate debits
/// it, so both paths push the shared retry counter in the same direction.
pub async fn forward_streaming(
    core: &RelayCore,
    metrics: &ProxyMetrics,
    req: &HttpRequest,
    body: Bytes,
    request_id: &str,
) -> Result<HttpResponse> {
    let candidates = core.candidates(true).await?;
    let headers = client_headers(req);
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| RelayError::Internal("invalid method".into()))?;
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut last_error = String::from("no candidate tried");
    let mut tried_per_group: HashMap<&str, usize> = HashMap::new();

    for (index, endpoint) in candidates.iter().enumerate() {
        metrics.record_dispatch(&endpoint.name);
        let request = build_upstream_request(
            core,
            endpoint,
            &method,
            path_and_query,
            &headers,
            body.clone(),
            true,
        );

        match request.send().await {
            Ok(upstream) => {
                let status = upstream.status();
                if !status.is_client_error() && !status.is_server_error() {
                    debug!(request_id, endpoint = %endpoint.name, "Streaming from upstream");
                    core.groups.mark_succeeded(&endpoint.group);
                    return Ok(relay_stream(
                        upstream,
                        &core.config.relay.streaming,
                        request_id.to_string(),
                        endpoint.name.clone(),
                    ));
                }
                last_error = format!("{}: status {}", endpoint.name, status.as_u16());
                warn!(
                    request_id,
                    endpoint = %endpoint.name,
                    status = status.as_u16(),
                    "Streaming candidate refused, advancing"
                );
            }
            Err(e) => {
                last_error = format!("{}: {}", endpoint.name, e);
                warn!(
                    request_id,
                    endpoint = %endpoint.name,
                    error = %e,
                    "Streaming candidate unreachable, advancing"
                );
            }
        }

        // Same group bookkeeping as the buffered driver: debit the group
        // once its last candidate in this request has failed
        let tried = tried_per_group.entry(endpoint.group.as_str()).or_insert(0);
        *tried += 1;
        let last_of_group = !candidates[index + 1..]
            .iter()
            .any(|e| e.group == endpoint.group);
        if last_of_group {
            let member_count = core.groups.members_of(&endpoint.group).len();
            core.groups
                .mark_failed(&endpoint.group, *tried >= member_count);
        }
    }

    Err(RelayError::AllEndpointsFailed { last_error })
}

/// Turn the upstream response into a flushing client response
fn relay_stream(
    upstream: reqwest::Response,
    config: &StreamingConfig,
    request_id: String,
    endpoint_name: String,
) -> HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(actix_web::http::StatusCode::OK);

    let mut builder = HttpResponse::build(status);
    let mut is_sse = false;
    for (name, value) in upstream.headers() {
        if HOP_BY_HOP_HEADERS
            .iter()
            .any(|h| name.as_str().eq_ignore_ascii_case(h))
            || name == reqwest::header::CONTENT_LENGTH
        {
            continue;
        }
        if name == reqwest::header::CONTENT_TYPE {
            is_sse = value
                .to_str()
                .is_ok_and(|v| v.to_ascii_lowercase().contains("text/event-stream"));
        }
        builder.append_header((name.as_str(), value.as_bytes()));
    }

    let heartbeat_interval = config.heartbeat_interval;
    let max_idle_time = config.max_idle_time;

    let body_stream = async_stream::stream! {
        let mut upstream_body = Box::pin(upstream.bytes_stream());
        let mut scanner = is_sse.then(UsageScanner::new);
        let mut idle_since = Instant::now();

        loop {
            match tokio::time::timeout(heartbeat_interval, upstream_body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    idle_since = Instant::now();
                    if let Some(scanner) = scanner.as_mut() {
                        scanner.observe(&chunk);
                    }
                    for segment in split_flush_segments(chunk) {
                        yield Ok::<Bytes, RelayError>(segment);
                    }
                }
                Ok(Some(Err(e))) => {
                    error!(
                        request_id = %request_id,
                        endpoint = %endpoint_name,
                        error = %e,
                        "Upstream stream interrupted, truncating client stream"
                    );
                    yield Err(RelayError::StreamInterrupted(e.to_string()));
                    break;
                }
                Ok(None) => {
                    if let Some(usage) = scanner.as_ref().and_then(|s| s.last_usage()) {
                        debug!(request_id = %request_id, endpoint = %endpoint_name, ?usage, "Stream complete");
                    }
                    break;
                }
                Err(_elapsed) => {
                    if idle_since.elapsed() >= max_idle_time {
                        error!(
                            request_id = %request_id,
                            endpoint = %endpoint_name,
                            idle = ?max_idle_time,
                            "Stream idle past deadline, aborting"
                        );
                        yield Err(RelayError::StreamInterrupted("idle timeout".into()));
                        break;
                    }
                    yield Ok(heartbeat_chunk());
                }
            }
        }
    };

    builder.streaming(body_stream)
}

/// SSE comment line keeping quiet streams alive
fn heartbeat_chunk() -> Bytes {
    Bytes::from(format!(": heartbeat {}\n\n", chrono::Utc::now().timestamp()))
}

/// Split a chunk into flush units: cut after every newline and at the
/// block-size ceiling, preserving bytes exactly
fn split_flush_segments(chunk: Bytes) -> Vec<Bytes> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut cursor = 0;

    while cursor < chunk.len() {
        let at_newline = chunk[cursor] == b'\n';
        cursor += 1;
        if at_newline || cursor - start >= MAX_FLUSH_BLOCK {
            segments.push(chunk.slice(start..cursor));
            start = cursor;
        }
    }
    if start < chunk.len() {
        segments.push(chunk.slice(start..));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(segments: &[Bytes]) -> Vec<u8> {
        segments.iter().flat_map(|s| s.iter().copied()).collect()
    }

    fn fake_upstream(
        chunks: Vec<std::result::Result<Bytes, std::io::Error>>,
    ) -> reqwest::Response {
        let body = reqwest::Body::wrap_stream(futures::stream::iter(chunks));
        let response = http::Response::builder()
            .status(200)
            .header("content-type", "text/event-stream")
            .header("content-length", "999")
            .body(body)
            .expect("valid response");
        reqwest::Response::from(response)
    }

    #[tokio::test]
    async fn test_relay_stream_passes_body_and_content_type() {
        let upstream = fake_upstream(vec![
            Ok(Bytes::from_static(b"data: hello\n\n")),
            Ok(Bytes::from_static(b"data: world\n\n")),
        ]);

        let resp = relay_stream(
            upstream,
            &StreamingConfig::default(),
            "req".into(),
            "a".into(),
        );
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert!(resp.headers().get("content-length").is_none());

        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body.as_ref(), b"data: hello\n\ndata: world\n\n");
    }

    #[tokio::test]
    async fn test_relay_stream_truncates_on_upstream_error() {
        let upstream = fake_upstream(vec![
            Ok(Bytes::from_static(b"data: partial\n\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
        ]);

        let resp = relay_stream(
            upstream,
            &StreamingConfig::default(),
            "req".into(),
            "a".into(),
        );

        // The delivered prefix is followed by an error that drops the
        // client connection; no failover happens at this point
        let result = actix_web::body::to_bytes(resp.into_body()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_segments_cut_at_newlines() {
        let chunk = Bytes::from_static(b"data: a\ndata: b\n\n");
        let segments = split_flush_segments(chunk.clone());
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].as_ref(), b"data: a\n");
        assert_eq!(segments[1].as_ref(), b"data: b\n");
        assert_eq!(segments[2].as_ref(), b"\n");
        assert_eq!(join(&segments), chunk.to_vec());
    }

    #[test]
    fn test_segments_cut_at_block_ceiling() {
        let chunk = Bytes::from(vec![b'x'; MAX_FLUSH_BLOCK * 2 + 100]);
        let segments = split_flush_segments(chunk.clone());
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.len() <= MAX_FLUSH_BLOCK));
        assert_eq!(join(&segments), chunk.to_vec());
    }

    #[test]
    fn test_trailing_partial_line_is_flushed() {
        let chunk = Bytes::from_static(b"data: partial");
        let segments = split_flush_segments(chunk.clone());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0], chunk);
    }

    #[test]
    fn test_empty_chunk_yields_nothing() {
        assert!(split_flush_segments(Bytes::new()).is_empty());
    }

    #[test]
    fn test_heartbeat_is_sse_comment() {
        let beat = heartbeat_chunk();
        assert!(beat.starts_with(b": heartbeat "));
        assert!(beat.ends_with(b"\n\n"));
    }
}
