//! Upstream HTTP client construction
//!
//! One client is built per configuration generation. The client carries a
//! connect timeout and idle-pool caps but no total deadline: the buffered
//! forwarding path applies a per-request timeout, while the streaming path
//! must stay open as long as the upstream keeps producing bytes. Redirects
//! are never followed; a 3xx belongs to the client, and following it would
//! re-issue the bearer token to whatever host the upstream names.

use crate::config::models::ProxyConfig;
use crate::utils::error::{RelayError, Result};
use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;

/// User agent presented to upstreams
const USER_AGENT: &str = concat!("claude-relay/", env!("CARGO_PKG_VERSION"));

/// Build the upstream client from the optional egress proxy settings
pub fn build_upstream_client(proxy: &ProxyConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90));

    if proxy.enabled {
        builder = builder.proxy(build_proxy(proxy)?);
    }

    builder
        .build()
        .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Translate the config block into a reqwest proxy
fn build_proxy(config: &ProxyConfig) -> Result<Proxy> {
    let url = config.proxy_url()?;

    let mut proxy = Proxy::all(&url)
        .map_err(|e| RelayError::Config(format!("Invalid proxy URL '{}': {}", url, e)))?;

    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        proxy = proxy.basic_auth(user, pass);
    }

    Ok(proxy)
}

/// Join an endpoint base URL with a request path + query string
pub fn join_upstream_url(base: &str, path_and_query: &str) -> String {
    let base = base.trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{}{}", base, path_and_query)
    } else {
        format!("{}/{}", base, path_and_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_upstream_url() {
        assert_eq!(
            join_upstream_url("http://upstream:8080/", "/v1/messages?beta=true"),
            "http://upstream:8080/v1/messages?beta=true"
        );
        assert_eq!(
            join_upstream_url("http://upstream:8080", "v1/messages"),
            "http://upstream:8080/v1/messages"
        );
    }

    #[test]
    fn test_client_without_proxy() {
        let config = ProxyConfig::default();
        assert!(build_upstream_client(&config).is_ok());
    }

    #[test]
    fn test_client_with_socks_proxy() {
        let config = ProxyConfig {
            enabled: true,
            proxy_type: "socks5".into(),
            host: Some("127.0.0.1".into()),
            port: Some(1080),
            ..Default::default()
        };
        assert!(build_upstream_client(&config).is_ok());
    }
}
