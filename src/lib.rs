//! API Tackle — a REST API scaffold with auth-token access control and
//! per-token call-count rate limiting.
//!
//! The core is the [`gate::AuthGate`]: a cache-backed gate that checks token
//! validity, enforces an optional call-count ceiling, and records usage
//! against both the token and the token+endpoint pair. Everything else is
//! glue around it: an axum router with two example endpoints, a SQLite-backed
//! token store, Prometheus metrics and a management CLI.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod gate;
pub mod metrics;
pub mod middleware;
pub mod store;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub gate: gate::AuthGate,
    pub metrics: metrics::Metrics,
    pub config: config::Config,
}
