//! Mirror Gate - a caching, rate-limiting API gateway
//!
//! Fronts a read-mostly upstream API with per-category TTL caches and
//! fixed-window rate limits.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod tasks;
pub mod upstream;

pub use api::AppState;
pub use config::Config;
pub use error::{GatewayError, Result};
pub use tasks::spawn_sweep_task;
