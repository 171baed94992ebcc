//! Fixed-Window Limiter
//!
//! At most `max` requests per identity per window; the counter starts over
//! when the window elapses.

use std::sync::Arc;

use super::window::WindowCore;
use super::{Decision, Limiter, LimiterStats, RequestMeta};
use crate::tasks::Sweep;

#[derive(Debug)]
pub struct FixedWindowLimiter {
    core: WindowCore,
    max: u32,
}

impl FixedWindowLimiter {
    pub(crate) fn from_parts(core: WindowCore, max: u32) -> Self {
        Self { core, max }
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Limiter for FixedWindowLimiter {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn check(&self, request: &RequestMeta) -> Decision {
        self.core.evaluate(request, || self.max)
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
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter(max: u32, clock: &ManualClock) -> FixedWindowLimiter {
        LimiterBuilder::new("fixed", WINDOW)
            .max(max)
            .clock(clock.shared())
            .build_fixed()
            .unwrap()
    }

    fn client(last: u8) -> RequestMeta {
        RequestMeta::from_addr(IpAddr::V4(Ipv4Addr::new(192, 168, 0, last)))
    }

    #[test]
    fn test_rejects_request_over_max() {
        let clock = ManualClock::new(5_000);
        let limiter = limiter(3, &clock);

        for expected_remaining in [2, 1, 0] {
            match limiter.check(&client(1)) {
                Decision::Allowed(info) => {
                    assert_eq!(info.limit, 3);
                    assert_eq!(info.remaining, expected_remaining);
                    assert_eq!(info.reset_at_ms, 65_000);
                }
                other => panic!("expected allowed, got {other:?}"),
            }
        }

        let Decision::Rejected(rejection) = limiter.check(&client(1)) else {
            panic!("fourth request should be rejected");
        };
        assert_eq!(rejection.info.limit, 3);
        assert_eq!(rejection.info.remaining, 0);
        assert!(rejection.retry_after_secs > 0);
        assert_eq!(rejection.retry_after_secs, 60);

        // Another identity has its own counter
        assert!(limiter.check(&client(2)).is_allowed());
    }

    #[test]
    fn test_window_elapses() {
        let clock = ManualClock::new(0);
        let limiter = limiter(1, &clock);

        assert!(limiter.check(&client(1)).is_allowed());
        assert!(!limiter.check(&client(1)).is_allowed());

        clock.advance(Duration::from_secs(30));
        let Decision::Rejected(rejection) = limiter.check(&client(1)) else {
            panic!("still inside the window");
        };
        assert_eq!(rejection.retry_after_secs, 30);

        clock.advance(Duration::from_secs(30));
        assert!(limiter.check(&client(1)).is_allowed());
    }

    #[test]
    fn test_reset_identity() {
        let clock = ManualClock::new(0);
        let limiter = limiter(1, &clock);

        limiter.check(&client(1));
        limiter.check(&client(2));
        assert!(!limiter.check(&client(1)).is_allowed());

        assert!(limiter.reset("192.168.0.1"));
        assert!(limiter.check(&client(1)).is_allowed());

        limiter.reset_all();
        assert_eq!(limiter.stats().counters.size, 0);
    }

    #[test]
    fn test_stats_counts_outcomes() {
        let clock = ManualClock::new(0);
        let limiter = limiter(2, &clock);

        for _ in 0..5 {
            limiter.check(&client(9));
        }

        let stats = limiter.stats();
        assert_eq!(stats.name, "fixed");
        assert_eq!(stats.window_ms, 60_000);
        assert_eq!(stats.allowed, 2);
        assert_eq!(stats.rejected, 3);
        assert_eq!(stats.counters.size, 1);
    }

    #[test]
    fn test_sweep_drops_idle_counters() {
        let clock = ManualClock::new(0);
        let limiter = limiter(5, &clock);

        limiter.check(&client(1));
        limiter.check(&client(2));
        clock.advance(WINDOW);

        assert_eq!(limiter.sweep_target().sweep(), 2);
        assert_eq!(limiter.stats().counters.size, 0);
    }
}
