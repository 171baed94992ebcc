//! Response DTOs for the gateway API
//!
//! Defines the structure of outgoing HTTP response bodies that are not
//! passed through from the upstream.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::{CacheStats, Category};
use crate::ratelimit::LimiterStats;

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Statistics per cache category
    pub caches: BTreeMap<String, CacheStats>,
    /// Statistics per limiter, empty when rate limiting is disabled
    pub limiters: Vec<LimiterStats>,
    /// Hit rate over all caches
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(caches: BTreeMap<Category, CacheStats>, limiters: Vec<LimiterStats>) -> Self {
        let totals = caches.values().fold(CacheStats::default(), |mut totals, s| {
            totals.hits += s.hits;
            totals.misses += s.misses;
            totals
        });

        Self {
            hit_rate: totals.compute_hit_rate(),
            caches: caches
                .into_iter()
                .map(|(category, stats)| (category.to_string(), stats))
                .collect(),
            limiters,
        }
    }
}

/// Response body for `DELETE /cache` and `DELETE /cache/:category`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    /// Categories that were cleared
    pub categories: Vec<String>,
}

impl InvalidateResponse {
    pub fn new(categories: &[Category]) -> Self {
        let categories: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
        Self {
            message: format!("Cleared {} cache(s)", categories.len()),
            categories,
        }
    }
}

/// Response body for `DELETE /ratelimit/users/:user`
#[derive(Debug, Clone, Serialize)]
pub struct LimitResetResponse {
    pub user: String,
    /// Whether a counter existed for the user
    pub reset: bool,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
