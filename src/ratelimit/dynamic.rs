//! Dynamic Limiter
//!
//! Fixed-window counting with a ceiling computed per request. A changed
//! ceiling applies to the running window; it does not start a new one.

use std::sync::Arc;

use super::window::WindowCore;
use super::{Decision, LimitFn, Limiter, LimiterStats, RequestMeta};
use crate::tasks::Sweep;

pub struct DynamicLimiter {
    core: WindowCore,
    limit_fn: LimitFn,
}

impl std::fmt::Debug for DynamicLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLimiter").field("core", &self.core).finish_non_exhaustive()
    }
}

impl DynamicLimiter {
    pub(crate) fn from_parts(core: WindowCore, limit_fn: LimitFn) -> Self {
        Self { core, limit_fn }
    }
}

impl Limiter for DynamicLimiter {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn check(&self, request: &RequestMeta) -> Decision {
        self.core.evaluate(request, || (self.limit_fn)(request))
    }

    fn reset(&self, identity: &str) -> bool {
        self.core.reset(identity)
    }

    fn reset_all(&self) {
        self.core.counters().reset_all();
    }

    fn stats(&self) -> LimiterStats {
        self.core.stats()
    }

    fn sweep_target(&self) -> Arc<dyn Sweep> {
        self.core.counters().sweep_target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::LimiterBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_lowered_limit_applies_to_running_window() {
        let clock = ManualClock::new(0);
        let ceiling = Arc::new(AtomicU32::new(5));
        let limiter = {
            let ceiling = Arc::clone(&ceiling);
            LimiterBuilder::new("dynamic", Duration::from_secs(60))
                .limit_fn(move |_| ceiling.load(Ordering::SeqCst))
                .clock(clock.shared())
                .build_dynamic()
                .unwrap()
        };
        let request = RequestMeta::default().with_user("alice");

        for _ in 0..3 {
            assert!(limiter.check(&request).is_allowed());
        }

        ceiling.store(2, Ordering::SeqCst);
        clock.advance(Duration::from_secs(10));

        let Decision::Rejected(rejection) = limiter.check(&request) else {
            panic!("count 4 is over the lowered limit");
        };
        assert_eq!(rejection.info.limit, 2);
        assert_eq!(rejection.retry_after_secs, 50);

        // Window was not restarted by the limit change
        let counter = limiter.core.counters().peek("dynamic:unknown").unwrap();
        assert_eq!(counter.count, 4);
        assert_eq!(counter.window_reset_at, 60_000);
    }

    #[test]
    fn test_limit_follows_request() {
        let clock = ManualClock::new(0);
        let limiter = LimiterBuilder::new("users", Duration::from_secs(60))
            .key_prefix("user-rate-limit")
            .key_fn(|request| request.user_id.clone().unwrap_or_else(|| "anonymous".into()))
            .limit_fn(|request| if request.user_id.is_some() { 3 } else { 1 })
            .clock(clock.shared())
            .build_dynamic()
            .unwrap();

        let anonymous = RequestMeta::default();
        let bob = RequestMeta::default().with_user("bob");

        assert!(limiter.check(&anonymous).is_allowed());
        assert!(!limiter.check(&anonymous).is_allowed());
        for _ in 0..3 {
            assert!(limiter.check(&bob).is_allowed());
        }
        assert!(!limiter.check(&bob).is_allowed());

        assert!(limiter.reset("bob"));
        assert!(limiter.check(&bob).is_allowed());
        assert!(limiter.core.counters().peek("user-rate-limit:anonymous").is_some());
    }
}
