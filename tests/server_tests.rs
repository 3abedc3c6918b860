//! Built-in endpoint and auth gate tests

use actix_web::{test, web};
use claude_relay::config::Config;
use claude_relay::config::models::RelayConfig;
use claude_relay::core::RelayCore;
use claude_relay::monitoring::ProxyMetrics;
use claude_relay::server::{AppState, RelayServer};
use std::sync::Arc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn state_from_yaml(yaml: &str) -> web::Data<AppState> {
    let relay: RelayConfig = serde_yaml::from_str(yaml).unwrap();
    let config = Config { relay };
    config.validate().unwrap();
    let metrics = Arc::new(ProxyMetrics::new().unwrap());
    let core = RelayCore::from_config(Arc::new(config), 1).unwrap();
    web::Data::new(AppState::new(core, metrics))
}

#[actix_web::test]
async fn test_health_reports_endpoint_counts() {
    let state = state_from_yaml(
        r#"
endpoints:
  - name: a
    url: http://a.invalid
  - name: b
    url: http://b.invalid
"#,
    );
    let app = test::init_service(RelayServer::create_app(state)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["healthy_endpoints"], 2);
    assert_eq!(body["total_endpoints"], 2);
}

#[actix_web::test]
async fn test_detailed_health_lists_endpoints_and_groups() {
    let state = state_from_yaml(
        r#"
endpoints:
  - name: a
    url: http://a.invalid
    priority: 1
    group: primary
    group-priority: 1
  - name: b
    url: http://b.invalid
    priority: 2
    group: backup
    group-priority: 2
"#,
    );
    let app = test::init_service(RelayServer::create_app(state)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/health/detailed").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["generation"], 1);
    let endpoints = body["endpoints"].as_array().unwrap();
    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0]["name"], "a");
    assert_eq!(endpoints[0]["group"], "primary");
    assert_eq!(endpoints[0]["healthy"], true);
    let groups = body["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["in_cooldown"], false);
}

#[actix_web::test]
async fn test_metrics_exposition() {
    let state = state_from_yaml(
        r#"
endpoints:
  - name: a
    url: http://a.invalid
"#,
    );
    let app = test::init_service(RelayServer::create_app(state)).await;

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);

    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();
    assert!(text.contains("relay_requests_total"));
    assert!(text.contains("relay_active_connections"));
    assert!(text.contains("relay_response_time_p95_ms"));
}

#[actix_web::test]
async fn test_auth_gate_rejects_and_admits() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&upstream)
        .await;

    let yaml = format!(
        r#"
auth:
  enabled: true
  token: relay-secret
endpoints:
  - name: main
    url: {}
"#,
        upstream.uri()
    );
    let state = state_from_yaml(&yaml);
    let app = test::init_service(RelayServer::create_app(state)).await;

    // Missing token
    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/v1/messages").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 401);

    // Wrong scheme
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/v1/messages")
            .insert_header(("authorization", "relay-secret"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 401);

    // Exact match passes through to the upstream
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/v1/messages")
            .insert_header(("authorization", "Bearer relay-secret"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);

    // Health bypasses the gate
    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);
}
