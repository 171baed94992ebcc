//! Window Core
//!
//! The request-counting state machine shared by both limiters, and the
//! builder they are constructed from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use super::{
    CounterStore, Decision, DynamicLimiter, FixedWindowLimiter, KeyFn, LimitFn, LimiterStats,
    RateLimitInfo, Rejection, RejectionHandler, RequestMeta, SkipFn,
};
use crate::clock::{SharedClock, SystemClock};
use crate::error::{GatewayError, Result};

const DEFAULT_MESSAGE: &str = "Too many requests, please try again later";
const DEFAULT_MAX_KEYS: usize = 10_000;

// == Window Core ==
pub(crate) struct WindowCore {
    name: String,
    window: Duration,
    key_prefix: String,
    key_fn: KeyFn,
    skip: Option<SkipFn>,
    on_reject: RejectionHandler,
    counters: CounterStore,
    allowed: AtomicU64,
    rejected: AtomicU64,
    bypassed: AtomicU64,
}

impl std::fmt::Debug for WindowCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCore")
            .field("name", &self.name)
            .field("window", &self.window)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl WindowCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn counters(&self) -> &CounterStore {
        &self.counters
    }

    fn counter_key(&self, identity: &str) -> String {
        format!("{}:{}", self.key_prefix, identity)
    }

    /// Runs one request through the state machine with `limit` as its ceiling.
    ///
    /// `limit` is only evaluated when the request is not skipped.
    pub(crate) fn evaluate(&self, request: &RequestMeta, limit: impl FnOnce() -> u32) -> Decision {
        if self.skip.as_ref().is_some_and(|skip| skip(request)) {
            self.bypassed.fetch_add(1, Ordering::Relaxed);
            return Decision::Bypassed;
        }

        let identity = (self.key_fn)(request);
        let observed = self
            .counters
            .observe(&self.counter_key(&identity), limit(), self.window);

        let info = RateLimitInfo {
            limit: observed.limit,
            remaining: observed.remaining(),
            reset_at_ms: observed.window_reset_at,
        };

        if !observed.over_limit() {
            self.allowed.fetch_add(1, Ordering::Relaxed);
            return Decision::Allowed(info);
        }

        self.rejected.fetch_add(1, Ordering::Relaxed);
        let retry_after_secs = observed.retry_after_secs();
        warn!(
            limiter = %self.name,
            identity = %identity,
            count = observed.count,
            limit = observed.limit,
            retry_after_secs,
            "Rate limit exceeded"
        );

        Decision::Rejected(Rejection {
            body: (self.on_reject)(request, &info, retry_after_secs),
            info,
            retry_after_secs,
        })
    }

    pub(crate) fn reset(&self, identity: &str) -> bool {
        self.counters.reset(&self.counter_key(identity))
    }

    pub(crate) fn stats(&self) -> LimiterStats {
        LimiterStats {
            name: self.name.clone(),
            window_ms: self.window.as_millis() as u64,
            allowed: self.allowed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            counters: self.counters.stats(),
        }
    }
}

// == Builder ==
/// Configures a [`FixedWindowLimiter`] or a [`DynamicLimiter`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use mirror_gate::ratelimit::{Decision, Limiter, LimiterBuilder, RequestMeta};
///
/// let limiter = LimiterBuilder::new("login", Duration::from_secs(60))
///     .max(1)
///     .build_fixed()
///     .unwrap();
///
/// let request = RequestMeta::default();
/// assert!(limiter.check(&request).is_allowed());
/// assert!(matches!(limiter.check(&request), Decision::Rejected(_)));
/// ```
pub struct LimiterBuilder {
    name: String,
    window: Duration,
    max: u32,
    limit_fn: Option<LimitFn>,
    key_prefix: Option<String>,
    key_fn: Option<KeyFn>,
    skip: Option<SkipFn>,
    message: String,
    on_reject: Option<RejectionHandler>,
    max_keys: usize,
    clock: Option<SharedClock>,
}

impl LimiterBuilder {
    pub fn new(name: impl Into<String>, window: Duration) -> Self {
        Self {
            name: name.into(),
            window,
            max: 0,
            limit_fn: None,
            key_prefix: None,
            key_fn: None,
            skip: None,
            message: DEFAULT_MESSAGE.to_string(),
            on_reject: None,
            max_keys: DEFAULT_MAX_KEYS,
            clock: None,
        }
    }

    /// Ceiling of a fixed-window limiter.
    pub fn max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }

    /// Per-request ceiling of a dynamic limiter.
    pub fn limit_fn(mut self, limit_fn: impl Fn(&RequestMeta) -> u32 + Send + Sync + 'static) -> Self {
        self.limit_fn = Some(Arc::new(limit_fn));
        self
    }

    /// Prefix of counter keys. Defaults to the limiter name.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Identity resolver. Defaults to the source address.
    pub fn key_fn(mut self, key_fn: impl Fn(&RequestMeta) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn skip(mut self, skip: impl Fn(&RequestMeta) -> bool + Send + Sync + 'static) -> Self {
        self.skip = Some(Arc::new(skip));
        self
    }

    /// Message used by the default rejection body.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Replaces the default rejection body.
    pub fn on_reject(
        mut self,
        handler: impl Fn(&RequestMeta, &RateLimitInfo, u64) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.on_reject = Some(Arc::new(handler));
        self
    }

    /// Upper bound on tracked identities.
    pub fn max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build_fixed(self) -> Result<FixedWindowLimiter> {
        if self.max == 0 {
            return Err(GatewayError::Configuration(format!(
                "limiter '{}' needs a positive max",
                self.name
            )));
        }
        let max = self.max;
        Ok(FixedWindowLimiter::from_parts(self.into_core()?, max))
    }

    pub fn build_dynamic(mut self) -> Result<DynamicLimiter> {
        let Some(limit_fn) = self.limit_fn.take() else {
            return Err(GatewayError::Configuration(format!(
                "limiter '{}' needs a limit function",
                self.name
            )));
        };
        Ok(DynamicLimiter::from_parts(self.into_core()?, limit_fn))
    }

    fn into_core(self) -> Result<WindowCore> {
        if self.window.is_zero() {
            return Err(GatewayError::Configuration(format!(
                "limiter '{}' needs a positive window",
                self.name
            )));
        }

        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let counters = CounterStore::new(self.name.clone(), self.max_keys, self.window, clock)?;

        let key_fn: KeyFn = match self.key_fn {
            Some(key_fn) => key_fn,
            None => Arc::new(RequestMeta::source),
        };
        let on_reject: RejectionHandler = match self.on_reject {
            Some(handler) => handler,
            None => {
                let message = self.message;
                Arc::new(move |_: &RequestMeta, info: &RateLimitInfo, retry_after: u64| {
                    json!({
                        "status": "error",
                        "message": message,
                        "limit": info.limit,
                        "remaining": 0,
                        "retryAfter": retry_after,
                    })
                })
            }
        };

        Ok(WindowCore {
            key_prefix: self.key_prefix.unwrap_or_else(|| self.name.clone()),
            key_fn,
            skip: self.skip,
            on_reject,
            counters,
            window: self.window,
            name: self.name,
            allowed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::Limiter;

    #[test]
    fn test_fixed_requires_positive_max() {
        let result = LimiterBuilder::new("zero", Duration::from_secs(1)).build_fixed();
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_dynamic_requires_limit_fn() {
        let result = LimiterBuilder::new("dyn", Duration::from_secs(1)).build_dynamic();
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = LimiterBuilder::new("w", Duration::ZERO).max(3).build_fixed();
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_default_rejection_body() {
        let clock = ManualClock::new(0);
        let limiter = LimiterBuilder::new("body", Duration::from_secs(90))
            .max(1)
            .message("slow down")
            .clock(clock.shared())
            .build_fixed()
            .unwrap();

        limiter.check(&RequestMeta::default());
        let Decision::Rejected(rejection) = limiter.check(&RequestMeta::default()) else {
            panic!("second request should be rejected");
        };
        assert_eq!(
            rejection.body,
            json!({"status": "error", "message": "slow down", "limit": 1, "remaining": 0, "retryAfter": 90})
        );
    }

    #[test]
    fn test_skip_bypasses_without_counting() {
        let limiter = LimiterBuilder::new("skip", Duration::from_secs(60))
            .max(1)
            .skip(|request| request.path == "/health")
            .clock(ManualClock::new(0).shared())
            .build_fixed()
            .unwrap();
        let health = RequestMeta::default().with_path("/health");

        for _ in 0..5 {
            assert_eq!(limiter.check(&health), Decision::Bypassed);
        }
        assert!(limiter.check(&RequestMeta::default()).is_allowed());

        let stats = limiter.stats();
        assert_eq!(stats.bypassed, 5);
        assert_eq!(stats.allowed, 1);
        assert_eq!(stats.counters.size, 1);
    }

    #[test]
    fn test_custom_rejection_handler() {
        let limiter = LimiterBuilder::new("custom", Duration::from_secs(60))
            .max(1)
            .on_reject(|request, info, _| json!({"who": request.source(), "limit": info.limit}))
            .clock(ManualClock::new(0).shared())
            .build_fixed()
            .unwrap();

        limiter.check(&RequestMeta::default());
        match limiter.check(&RequestMeta::default()) {
            Decision::Rejected(rejection) => {
                assert_eq!(rejection.body, json!({"who": "unknown", "limit": 1}));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }
}
