//! Server middleware

pub mod auth;

pub use auth::AuthGate;
