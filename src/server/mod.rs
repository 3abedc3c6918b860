//! HTTP server: listener, state, middleware and routes

pub mod builder;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use builder::{RunOptions, run_server};
pub use server::RelayServer;
pub use state::AppState;
