//! Rate Limit Module
//!
//! Window-based request limiting per client identity.
//!
//! Both limiters run the same two-state machine per identity key
//! (under/over the limit, re-evaluated on every request) on top of a
//! [`CounterStore`]. The fixed-window limiter has a constant ceiling; the
//! dynamic one computes the ceiling per request.
//!
//! Being over the limit is not an error: [`Limiter::check`] returns a
//! [`Decision`] and callers translate [`Decision::Rejected`] into whatever
//! their transport uses (HTTP 429 in this crate).

mod counter;
mod dynamic;
mod fixed;
mod registry;
mod window;

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::tasks::Sweep;

pub use counter::{CounterStore, Observation, RateLimitCounter};
pub use dynamic::DynamicLimiter;
pub use fixed::FixedWindowLimiter;
pub use registry::{user_identity, LimiterRegistry, RoutePolicy, USER_KEY_PREFIX};
pub use window::LimiterBuilder;

/// Resolves the identity a request is counted under.
pub type KeyFn = Arc<dyn Fn(&RequestMeta) -> String + Send + Sync>;
/// Requests matching this predicate bypass the limiter entirely.
pub type SkipFn = Arc<dyn Fn(&RequestMeta) -> bool + Send + Sync>;
/// Computes the ceiling for a request (dynamic limiter).
pub type LimitFn = Arc<dyn Fn(&RequestMeta) -> u32 + Send + Sync>;
/// Builds the body of a rejection from the request, quota info and retry-after seconds.
pub type RejectionHandler = Arc<dyn Fn(&RequestMeta, &RateLimitInfo, u64) -> Value + Send + Sync>;

// == Request Meta ==
/// What a limiter may look at in a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub remote_addr: Option<IpAddr>,
    pub path: String,
    /// Caller-supplied user id (`x-user-id`)
    pub user_id: Option<String>,
}

impl RequestMeta {
    pub fn from_addr(addr: IpAddr) -> Self {
        Self {
            remote_addr: Some(addr),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Source address as a string, `unknown` when the transport gave none.
    pub fn source(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

// == Decision ==
/// Remaining quota attached to an evaluated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Unix milliseconds at which the window resets
    pub reset_at_ms: u64,
}

impl RateLimitInfo {
    /// Reset time in Unix seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}

/// A request refused because its identity is over quota.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub info: RateLimitInfo,
    /// Whole seconds until the window resets, rounded up
    pub retry_after_secs: u64,
    /// Response body, from the limiter's rejection handler
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed(RateLimitInfo),
    Rejected(Rejection),
    /// The skip predicate matched; nothing was counted.
    Bypassed,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Rejected(_))
    }
}

// == Limiter ==
pub trait Limiter: Send + Sync {
    fn name(&self) -> &str;

    /// Counts the request and decides whether it may proceed.
    fn check(&self, request: &RequestMeta) -> Decision;

    /// Forgets the counter for an identity (as produced by the key function).
    fn reset(&self, identity: &str) -> bool;

    fn reset_all(&self);

    fn stats(&self) -> LimiterStats;

    /// Counter storage, for the background sweeper.
    fn sweep_target(&self) -> Arc<dyn Sweep>;
}

/// Pull-based snapshot of a limiter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterStats {
    pub name: String,
    pub window_ms: u64,
    pub allowed: u64,
    pub rejected: u64,
    pub bypassed: u64,
    /// Counter store statistics; `size` is the number of tracked identities
    pub counters: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_source_defaults_to_unknown() {
        assert_eq!(RequestMeta::default().source(), "unknown");
        let meta = RequestMeta::from_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(meta.source(), "10.0.0.1");
    }

    #[test]
    fn test_reset_epoch_rounds_up() {
        let info = RateLimitInfo {
            limit: 1,
            remaining: 0,
            reset_at_ms: 1_000_001,
        };
        assert_eq!(info.reset_epoch_secs(), 1_001);
    }
}
