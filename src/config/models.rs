//! Configuration models
//!
//! All structs deserialized from the relay YAML file, plus the parse-time
//! transformations applied to the endpoint list (defaults inheritance and
//! the CLI priority override).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::utils::error::{RelayError, Result};

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Endpoint selection strategy
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Per-endpoint retry behaviour
    #[serde(default)]
    pub retry: RetryConfig,
    /// Background health probing
    #[serde(default)]
    pub health: HealthConfig,
    /// Default per-endpoint timeout when an endpoint sets none
    #[serde(default = "default_global_timeout", with = "duration_str")]
    pub global_timeout: Duration,
    /// Group cooldown behaviour
    #[serde(default)]
    pub group: GroupConfig,
    /// Ingress authentication
    #[serde(default)]
    pub auth: AuthConfig,
    /// Streaming dispatch tuning
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Egress proxy
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Upstream endpoints, in declaration order
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Ingress body cap in bytes; larger bodies are rejected with 413
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Endpoint selection strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy name
    #[serde(default, rename = "type")]
    pub strategy_type: StrategyType,
    /// Run on-demand latency probes for the fastest strategy
    #[serde(default)]
    pub fast_test_enabled: bool,
    /// How long a fast-test result stays valid
    #[serde(default = "default_fast_test_cache_ttl", with = "duration_str")]
    pub fast_test_cache_ttl: Duration,
    /// Per-probe deadline
    #[serde(default = "default_fast_test_timeout", with = "duration_str")]
    pub fast_test_timeout: Duration,
    /// Path probed by the fast tester
    #[serde(default = "default_fast_test_path")]
    pub fast_test_path: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            strategy_type: StrategyType::default(),
            fast_test_enabled: false,
            fast_test_cache_ttl: default_fast_test_cache_ttl(),
            fast_test_timeout: default_fast_test_timeout(),
            fast_test_path: default_fast_test_path(),
        }
    }
}

/// Candidate ordering strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyType {
    /// Ascending endpoint priority, stable on ties
    #[default]
    Priority,
    /// Ascending measured latency
    Fastest,
    /// Stable order rotated by a monotonic counter
    RoundRobin,
}

/// Per-endpoint retry behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per endpoint before moving on
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff sleep
    #[serde(default = "default_base_delay", with = "duration_str")]
    pub base_delay: Duration,
    /// Backoff ceiling
    #[serde(default = "default_max_delay", with = "duration_str")]
    pub max_delay: Duration,
    /// Exponential growth factor
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

/// Background health probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Probe period
    #[serde(default = "default_check_interval", with = "duration_str")]
    pub check_interval: Duration,
    /// Per-probe deadline
    #[serde(default = "default_health_timeout", with = "duration_str")]
    pub timeout: Duration,
    /// Path appended to each endpoint base URL
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            timeout: default_health_timeout(),
            health_path: default_health_path(),
        }
    }
}

/// Group cooldown behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// How long an exhausted group stays out of rotation
    #[serde(default = "default_cooldown", with = "duration_str")]
    pub cooldown: Duration,
    /// Consecutive group-wide failures tolerated before cooldown
    #[serde(default = "default_group_max_retries")]
    pub max_retries: u32,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            max_retries: default_group_max_retries(),
        }
    }
}

/// Ingress authentication
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Require a bearer token on client requests
    #[serde(default)]
    pub enabled: bool,
    /// The expected token
    #[serde(default)]
    pub token: String,
}

/// Streaming dispatch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Comment-line heartbeat period while the upstream is quiet
    #[serde(default = "default_heartbeat_interval", with = "duration_str")]
    pub heartbeat_interval: Duration,
    /// Idle ceiling after which the stream is aborted
    #[serde(default = "default_max_idle_time", with = "duration_str")]
    pub max_idle_time: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            max_idle_time: default_max_idle_time(),
        }
    }
}

/// Egress proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Route upstream traffic through a proxy
    #[serde(default)]
    pub enabled: bool,
    /// One of http, https, socks5
    #[serde(default = "default_proxy_type", rename = "type")]
    pub proxy_type: String,
    /// Full proxy URL; takes precedence over host/port
    #[serde(default)]
    pub url: Option<String>,
    /// Proxy host when no URL is given
    #[serde(default)]
    pub host: Option<String>,
    /// Proxy port when no URL is given
    #[serde(default)]
    pub port: Option<u16>,
    /// Basic-auth user
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proxy_type: default_proxy_type(),
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
        }
    }
}

impl ProxyConfig {
    /// Resolve the effective proxy URL
    pub fn proxy_url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Ok(format!("{}://{}:{}", self.proxy_type, host, port)),
            _ => Err(RelayError::Config(
                "proxy.enabled requires either proxy.url or proxy.host + proxy.port".into(),
            )),
        }
    }
}

/// A single upstream endpoint as declared in the config file
///
/// Optional fields left `None` are filled in by [`apply_endpoint_inheritance`]
/// before the endpoint set is handed to the registry. Credentials are never
/// inherited here; they resolve dynamically through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Unique endpoint name
    pub name: String,
    /// Upstream base URL
    pub url: String,
    /// Endpoint priority, lower preferred
    #[serde(default = "default_endpoint_priority")]
    pub priority: u32,
    /// Failover group; empty means the synthetic Default group
    #[serde(default)]
    pub group: Option<String>,
    /// Group priority, lower preferred
    #[serde(default, rename = "group-priority")]
    pub group_priority: Option<u32>,
    /// Bearer token sent upstream
    #[serde(default)]
    pub token: Option<String>,
    /// API-key header value sent upstream
    #[serde(default, rename = "api-key")]
    pub api_key: Option<String>,
    /// Per-endpoint total deadline for buffered requests
    #[serde(default, with = "duration_opt")]
    pub timeout: Option<Duration>,
    /// Extra headers merged into upstream requests
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// Name of the synthetic group for endpoints that declare none
pub const DEFAULT_GROUP: &str = "Default";

/// Fill in inherited endpoint fields
///
/// `timeout` and `headers` inherit statically from the first declared
/// endpoint (falling back to `global_timeout` / empty). `group` and
/// `group-priority` inherit from the immediately preceding endpoint.
/// Tokens and api-keys are deliberately untouched.
pub fn apply_endpoint_inheritance(endpoints: &mut [EndpointConfig], global_timeout: Duration) {
    if endpoints.is_empty() {
        return;
    }

    let first_timeout = endpoints[0].timeout.unwrap_or(global_timeout);
    let first_headers = endpoints[0].headers.clone().unwrap_or_default();

    let mut prev_group = DEFAULT_GROUP.to_string();
    let mut prev_group_priority = 0;

    for endpoint in endpoints.iter_mut() {
        if endpoint.timeout.is_none() {
            endpoint.timeout = Some(first_timeout);
        }
        if endpoint.headers.is_none() {
            endpoint.headers = Some(first_headers.clone());
        }

        match &endpoint.group {
            None => endpoint.group = Some(prev_group.clone()),
            Some(g) if g.is_empty() => endpoint.group = Some(DEFAULT_GROUP.to_string()),
            Some(_) => {}
        }
        if endpoint.group_priority.is_none() {
            endpoint.group_priority = Some(prev_group_priority);
        }

        prev_group = endpoint.group.clone().unwrap_or_default();
        prev_group_priority = endpoint.group_priority.unwrap_or(0);
    }
}

/// Apply the `-p` runtime priority override
///
/// The named endpoint is promoted to priority 1; endpoints whose configured
/// priority was already ≤ 1 are shifted up by 2 so the promoted one wins
/// outright.
pub fn apply_priority_override(endpoints: &mut [EndpointConfig], promoted: &str) -> Result<()> {
    if !endpoints.iter().any(|e| e.name == promoted) {
        return Err(RelayError::Config(format!(
            "Priority override names unknown endpoint '{}'",
            promoted
        )));
    }

    for endpoint in endpoints.iter_mut() {
        if endpoint.name == promoted {
            continue;
        }
        if endpoint.priority <= 1 {
            endpoint.priority += 2;
        }
    }
    for endpoint in endpoints.iter_mut() {
        if endpoint.name == promoted {
            endpoint.priority = 1;
        }
    }

    Ok(())
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_size() -> usize {
    32 * 1024 * 1024
}

fn default_fast_test_cache_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_fast_test_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_fast_test_path() -> String {
    "/v1/models".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_health_path() -> String {
    "/v1/models".to_string()
}

fn default_global_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_group_max_retries() -> u32 {
    3
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_max_idle_time() -> Duration {
    Duration::from_secs(120)
}

fn default_proxy_type() -> String {
    "http".to_string()
}

fn default_endpoint_priority() -> u32 {
    100
}

/// Serde support for humane duration strings (`500ms`, `30s`, `2m`, `1h`)
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    /// Parse a duration from a humane string or a bare number of seconds
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
            Some(idx) => (&s[..idx], s[idx..].trim()),
            None => (s, ""),
        };
        let value: f64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{}'", s))?;
        let millis = match unit {
            "ms" => value,
            "" | "s" => value * 1_000.0,
            "m" => value * 60_000.0,
            "h" => value * 3_600_000.0,
            other => return Err(format!("unknown duration unit '{}'", other)),
        };
        Ok(Duration::from_millis(millis as u64))
    }

    /// Render a duration back to its most compact unit
    pub fn format(d: &Duration) -> String {
        let millis = d.as_millis();
        if millis % 60_000 == 0 && millis > 0 {
            format!("{}m", millis / 60_000)
        } else if millis % 1_000 == 0 {
            format!("{}s", millis / 1_000)
        } else {
            format!("{}ms", millis)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(d))
    }
}

/// Serde support for optional duration strings
pub mod duration_opt {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| super::duration_str::parse(&s).map_err(D::Error::custom))
            .transpose()
    }

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&super::duration_str::format(d)),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str) -> EndpointConfig {
        EndpointConfig {
            name: name.to_string(),
            url: format!("http://{}.example", name),
            priority: 100,
            group: None,
            group_priority: None,
            token: None,
            api_key: None,
            timeout: None,
            headers: None,
        }
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(
            duration_str::parse("500ms").unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(duration_str::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(duration_str::parse("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(duration_str::parse("45").unwrap(), Duration::from_secs(45));
        assert!(duration_str::parse("10 fortnights").is_err());
    }

    #[test]
    fn test_inheritance_from_first_endpoint() {
        let mut endpoints = vec![endpoint("a"), endpoint("b")];
        endpoints[0].timeout = Some(Duration::from_secs(90));
        endpoints[0].headers = Some(HashMap::from([(
            "anthropic-version".to_string(),
            "2023-06-01".to_string(),
        )]));

        apply_endpoint_inheritance(&mut endpoints, Duration::from_secs(300));

        assert_eq!(endpoints[1].timeout, Some(Duration::from_secs(90)));
        assert_eq!(
            endpoints[1].headers.as_ref().unwrap()["anthropic-version"],
            "2023-06-01"
        );
    }

    #[test]
    fn test_group_inherits_from_preceding_endpoint() {
        let mut endpoints = vec![endpoint("a"), endpoint("b"), endpoint("c")];
        endpoints[1].group = Some("backup".to_string());
        endpoints[1].group_priority = Some(2);

        apply_endpoint_inheritance(&mut endpoints, Duration::from_secs(300));

        assert_eq!(endpoints[0].group.as_deref(), Some(DEFAULT_GROUP));
        assert_eq!(endpoints[2].group.as_deref(), Some("backup"));
        assert_eq!(endpoints[2].group_priority, Some(2));
    }

    #[test]
    fn test_tokens_are_never_inherited() {
        let mut endpoints = vec![endpoint("a"), endpoint("b")];
        endpoints[0].token = Some("sk-first".to_string());
        endpoints[0].api_key = Some("key-first".to_string());

        apply_endpoint_inheritance(&mut endpoints, Duration::from_secs(300));

        assert_eq!(endpoints[1].token, None);
        assert_eq!(endpoints[1].api_key, None);
    }

    #[test]
    fn test_priority_override_promotes_and_shifts() {
        let mut endpoints = vec![endpoint("a"), endpoint("b"), endpoint("c")];
        endpoints[0].priority = 1;
        endpoints[1].priority = 0;
        endpoints[2].priority = 5;

        apply_priority_override(&mut endpoints, "c").unwrap();

        assert_eq!(endpoints[0].priority, 3);
        assert_eq!(endpoints[1].priority, 2);
        assert_eq!(endpoints[2].priority, 1);
    }

    #[test]
    fn test_priority_override_unknown_endpoint() {
        let mut endpoints = vec![endpoint("a")];
        assert!(apply_priority_override(&mut endpoints, "missing").is_err());
    }

    #[test]
    fn test_yaml_round_trip_with_kebab_keys() {
        let yaml = r#"
name: main
url: http://upstream:9000
priority: 1
group: primary
group-priority: 1
api-key: secret
timeout: 90s
"#;
        let parsed: EndpointConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.group_priority, Some(1));
        assert_eq!(parsed.api_key.as_deref(), Some("secret"));
        assert_eq!(parsed.timeout, Some(Duration::from_secs(90)));
    }
}
