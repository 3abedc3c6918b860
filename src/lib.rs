//! claude-relay - transparent reverse proxy for Claude-style LLM APIs
//!
//! The relay accepts client requests on a local listener and forwards each
//! to one of several configured upstream endpoints, rewriting credentials
//! and streaming responses back. Its core is a health-tracked, group-aware
//! endpoint selector, a status-aware retry/failover driver, a dual-mode
//! (buffered / byte-streaming) response forwarder and a hot-reloadable
//! configuration surface that re-plumbs all of the above without dropping
//! in-flight requests.
//!
//! # Architecture
//!
//! - [`config`]: YAML models, parse-time endpoint inheritance, the file
//!   watcher that republishes the routing core
//! - [`core`]: endpoint registry, group state machine, selection
//!   strategies, fast tester, retry driver and the two forwarding paths
//! - [`health`]: the background liveness prober
//! - [`monitoring`]: Prometheus request metrics
//! - [`server`]: actix-web listener, auth gate, built-in routes
//! - [`utils`]: error taxonomy and upstream client construction

pub mod config;
pub mod core;
pub mod health;
pub mod monitoring;
pub mod server;
pub mod utils;

pub use config::Config;
pub use core::RelayCore;
pub use server::{AppState, RelayServer, RunOptions, run_server};
pub use utils::error::{RelayError, Result};
