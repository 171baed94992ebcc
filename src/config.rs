//! Configuration Module
//!
//! Handles loading and managing gateway configuration from environment variables.

use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::ComputeMode;
use crate::error::{GatewayError, Result};

/// Gateway configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
}

/// Where and how to reach the upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL for JSON API calls
    pub api_url: String,
    /// Base URL for thumbnails and avatars
    pub uploads_url: String,
    /// Base URL for project sources
    pub projects_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

/// Settings shared by every named cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries per named cache
    pub max_entries: usize,
    /// Interval between background expiry sweeps
    pub sweep_interval: Duration,
    pub compute_mode: ComputeMode,
}

/// Rate limiting settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Addresses that bypass every limiter
    pub trusted_ips: Vec<IpAddr>,
    /// Window of the per-user limiter
    pub user_window: Duration,
    /// Per-user ceiling for callers without an `x-user-id`
    pub anonymous_limit: u32,
    /// Per-user ceiling for identified callers
    pub identified_limit: u32,
    /// Maximum number of identities tracked per limiter
    pub max_tracked_keys: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.scratch.mit.edu/".to_string(),
            uploads_url: "https://uploads.scratch.mit.edu/".to_string(),
            projects_url: "https://projects.scratch.mit.edu/".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: "MirrorGate/1.0".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            sweep_interval: Duration::from_secs(300),
            compute_mode: ComputeMode::SingleFlight,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trusted_ips: Vec::new(),
            user_window: Duration::from_secs(3600),
            anonymous_limit: 200,
            identified_limit: 1000,
            max_tracked_keys: 10_000,
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_API_URL`, `UPSTREAM_UPLOADS_URL`, `UPSTREAM_PROJECTS_URL` - upstream base URLs
    /// - `UPSTREAM_TIMEOUT_SECS` - upstream request timeout (default: 10)
    /// - `UPSTREAM_USER_AGENT` - user agent sent upstream
    /// - `CACHE_MAX_ENTRIES` - entries per named cache (default: 1000)
    /// - `CACHE_SWEEP_INTERVAL` - sweep frequency in seconds (default: 300)
    /// - `CACHE_SINGLE_FLIGHT` - de-duplicate concurrent misses (default: true)
    /// - `RATE_LIMIT_ENABLED` - (default: true)
    /// - `RATE_LIMIT_TRUSTED_IPS` - comma separated addresses that are never limited
    /// - `USER_LIMIT_WINDOW_SECS` - per-user window (default: 3600)
    /// - `USER_LIMIT_ANONYMOUS` - per-user ceiling without `x-user-id` (default: 200)
    /// - `USER_LIMIT_IDENTIFIED` - per-user ceiling with `x-user-id` (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            upstream: UpstreamConfig {
                api_url: env_or("UPSTREAM_API_URL", defaults.upstream.api_url),
                uploads_url: env_or("UPSTREAM_UPLOADS_URL", defaults.upstream.uploads_url),
                projects_url: env_or("UPSTREAM_PROJECTS_URL", defaults.upstream.projects_url),
                timeout: Duration::from_secs(env_or(
                    "UPSTREAM_TIMEOUT_SECS",
                    defaults.upstream.timeout.as_secs(),
                )),
                user_agent: env_or("UPSTREAM_USER_AGENT", defaults.upstream.user_agent),
            },
            cache: CacheConfig {
                max_entries: env_or("CACHE_MAX_ENTRIES", defaults.cache.max_entries),
                sweep_interval: Duration::from_secs(env_or(
                    "CACHE_SWEEP_INTERVAL",
                    defaults.cache.sweep_interval.as_secs(),
                )),
                compute_mode: if env_or("CACHE_SINGLE_FLIGHT", true) {
                    ComputeMode::SingleFlight
                } else {
                    ComputeMode::Independent
                },
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("RATE_LIMIT_ENABLED", defaults.rate_limit.enabled),
                trusted_ips: env::var("RATE_LIMIT_TRUSTED_IPS")
                    .map(|v| parse_ip_list(&v))
                    .unwrap_or_default(),
                user_window: Duration::from_secs(env_or(
                    "USER_LIMIT_WINDOW_SECS",
                    defaults.rate_limit.user_window.as_secs(),
                )),
                anonymous_limit: env_or("USER_LIMIT_ANONYMOUS", defaults.rate_limit.anonymous_limit),
                identified_limit: env_or("USER_LIMIT_IDENTIFIED", defaults.rate_limit.identified_limit),
                max_tracked_keys: defaults.rate_limit.max_tracked_keys,
            },
        }
    }

    /// Rejects settings the caches and limiters cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(GatewayError::Configuration("CACHE_MAX_ENTRIES must be at least 1".into()));
        }
        if self.cache.sweep_interval.is_zero() {
            return Err(GatewayError::Configuration("CACHE_SWEEP_INTERVAL must be positive".into()));
        }
        if self.upstream.timeout.is_zero() {
            return Err(GatewayError::Configuration("UPSTREAM_TIMEOUT_SECS must be positive".into()));
        }
        if self.rate_limit.user_window.is_zero() {
            return Err(GatewayError::Configuration("USER_LIMIT_WINDOW_SECS must be positive".into()));
        }
        if self.rate_limit.anonymous_limit == 0 {
            return Err(GatewayError::Configuration("USER_LIMIT_ANONYMOUS must be at least 1".into()));
        }
        if self.rate_limit.identified_limit == 0 {
            return Err(GatewayError::Configuration("USER_LIMIT_IDENTIFIED must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_ip_list(raw: &str) -> Vec<IpAddr> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}
