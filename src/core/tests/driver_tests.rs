//! Retry driver scenarios against stub upstreams

use crate::config::models::{EndpointConfig, RetryConfig};
use crate::core::endpoint::Endpoint;
use crate::core::group::GroupManager;
use crate::core::retry::RetryDriver;
use crate::monitoring::metrics::ProxyMetrics;
use crate::utils::error::RelayError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(name: &str, url: &str, group: &str) -> Arc<Endpoint> {
    Arc::new(Endpoint::from_config(
        &EndpointConfig {
            name: name.to_string(),
            url: url.to_string(),
            priority: 100,
            group: Some(group.to_string()),
            group_priority: Some(0),
            token: None,
            api_key: None,
            timeout: None,
            headers: None,
        },
        Duration::from_secs(5),
    ))
}

fn groups(endpoints: &[Arc<Endpoint>], max_retries: u32) -> GroupManager {
    GroupManager::new(
        endpoints
            .iter()
            .map(|e| (e.group.clone(), e.group_priority, e.name.clone())),
        Duration::from_secs(60),
        max_retries,
    )
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(80),
        multiplier: 2.0,
    }
}

fn op(client: reqwest::Client) -> impl Fn(Arc<Endpoint>) -> reqwest::RequestBuilder {
    move |e: Arc<Endpoint>| client.get(format!("{}/v1/messages", e.url))
}

#[tokio::test]
async fn test_retry_within_endpoint_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let candidates = vec![endpoint("a", &server.uri(), "g")];
    let group_mgr = groups(&candidates, 3);
    let metrics = ProxyMetrics::new().unwrap();
    let retry = fast_retry(3);
    let driver = RetryDriver::new(&retry, &group_mgr, &metrics);
    let send = op(reqwest::Client::new());

    let started = Instant::now();
    let response = driver
        .run(&candidates, "req-1", |e| {
            let request = send(e);
            async move { request.send().await }
        })
        .await
        .unwrap();

    // Two backoff sleeps: 10ms then 20ms
    assert_eq!(response.status().as_u16(), 200);
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(group_mgr.snapshot()[0].retry_count, 0);
    assert!(!group_mgr.in_cooldown("g"));

    let rendered = metrics.render().unwrap();
    assert!(rendered.contains("relay_endpoint_retries_total{endpoint=\"a\"} 2"));
}

#[tokio::test]
async fn test_failover_to_next_endpoint_in_group() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server_a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from-b"))
        .mount(&server_b)
        .await;

    let candidates = vec![
        endpoint("a", &server_a.uri(), "g"),
        endpoint("b", &server_b.uri(), "g"),
    ];
    let group_mgr = groups(&candidates, 3);
    let metrics = ProxyMetrics::new().unwrap();
    let retry = fast_retry(1);
    let driver = RetryDriver::new(&retry, &group_mgr, &metrics);
    let send = op(reqwest::Client::new());

    let response = driver
        .run(&candidates, "req-2", |e| {
            let request = send(e);
            async move { request.send().await }
        })
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "from-b");
    // B's success wiped A's failure; the group keeps rotating
    assert_eq!(group_mgr.snapshot()[0].retry_count, 0);
    assert!(!group_mgr.in_cooldown("g"));
}

#[tokio::test]
async fn test_non_retryable_status_passes_through_without_failover() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server_a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server_b)
        .await;

    let candidates = vec![
        endpoint("a", &server_a.uri(), "g"),
        endpoint("b", &server_b.uri(), "g"),
    ];
    let group_mgr = groups(&candidates, 3);
    let metrics = ProxyMetrics::new().unwrap();
    let retry = fast_retry(3);
    let driver = RetryDriver::new(&retry, &group_mgr, &metrics);
    let send = op(reqwest::Client::new());

    let response = driver
        .run(&candidates, "req-3", |e| {
            let request = send(e);
            async move { request.send().await }
        })
        .await
        .unwrap();

    // Exactly one upstream call: auth is a request-level fault
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(server_a.received_requests().await.unwrap().len(), 1);
    assert_eq!(group_mgr.snapshot()[0].retry_count, 0);
    assert!(!group_mgr.in_cooldown("g"));
    server_b.verify().await;
}

#[tokio::test]
async fn test_exhausting_whole_group_triggers_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let candidates = vec![endpoint("only", &server.uri(), "g1")];
    let group_mgr = groups(&candidates, 5);
    let metrics = ProxyMetrics::new().unwrap();
    let retry = fast_retry(2);
    let driver = RetryDriver::new(&retry, &group_mgr, &metrics);
    let send = op(reqwest::Client::new());

    let err = driver
        .run(&candidates, "req-4", |e| {
            let request = send(e);
            async move { request.send().await }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::AllEndpointsFailed { .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    // Every member exhausted in one request beats the retry counter
    assert!(group_mgr.in_cooldown("g1"));
}

#[tokio::test]
async fn test_transport_errors_count_like_statuses() {
    // Nothing listens on this port
    let candidates = vec![endpoint("dead", "http://127.0.0.1:9", "g")];
    let group_mgr = groups(&candidates, 5);
    let metrics = ProxyMetrics::new().unwrap();
    let retry = fast_retry(2);
    let driver = RetryDriver::new(&retry, &group_mgr, &metrics);
    let send = op(reqwest::Client::new());

    let err = driver
        .run(&candidates, "req-5", |e| {
            let request = send(e);
            async move { request.send().await }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::AllEndpointsFailed { .. }));
    assert!(group_mgr.in_cooldown("g"));
}

#[tokio::test]
async fn test_empty_candidate_list_fails_fast() {
    let group_mgr = groups(&[], 3);
    let metrics = ProxyMetrics::new().unwrap();
    let retry = fast_retry(3);
    let driver = RetryDriver::new(&retry, &group_mgr, &metrics);
    let send = op(reqwest::Client::new());

    let err = driver
        .run(&[], "req-6", |e| {
            let request = send(e);
            async move { request.send().await }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::NoHealthyEndpoints(_)));
}
