//! Limiter Registry
//!
//! Route presets and the set of limiters the gateway runs with.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use super::{DynamicLimiter, FixedWindowLimiter, Limiter, LimiterBuilder, LimiterStats, RequestMeta};
use crate::clock::SharedClock;
use crate::config::RateLimitConfig;
use crate::error::Result;
use crate::tasks::Sweep;

const MINUTE: u64 = 60;

/// Prefix of per-user counter keys.
pub const USER_KEY_PREFIX: &str = "user-rate-limit";

// == Route Policy ==
/// Named window/ceiling presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutePolicy {
    Default,
    /// Featured proxy
    Strict,
    /// News
    Relaxed,
    Projects,
    Users,
    Search,
    Thumbnails,
    Avatars,
    Studios,
}

impl RoutePolicy {
    /// Policies guarding a route group of the HTTP surface.
    pub const ROUTES: [RoutePolicy; 8] = [
        RoutePolicy::Projects,
        RoutePolicy::Users,
        RoutePolicy::Search,
        RoutePolicy::Thumbnails,
        RoutePolicy::Avatars,
        RoutePolicy::Studios,
        RoutePolicy::Strict,
        RoutePolicy::Relaxed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RoutePolicy::Default => "default",
            RoutePolicy::Strict => "strict",
            RoutePolicy::Relaxed => "relaxed",
            RoutePolicy::Projects => "projects",
            RoutePolicy::Users => "users",
            RoutePolicy::Search => "search",
            RoutePolicy::Thumbnails => "thumbnails",
            RoutePolicy::Avatars => "avatars",
            RoutePolicy::Studios => "studios",
        }
    }

    pub fn window(&self) -> Duration {
        let minutes = match self {
            RoutePolicy::Strict => 60,
            RoutePolicy::Relaxed | RoutePolicy::Thumbnails | RoutePolicy::Avatars => 5,
            _ => 15,
        };
        Duration::from_secs(minutes * MINUTE)
    }

    pub fn max(&self) -> u32 {
        match self {
            RoutePolicy::Default | RoutePolicy::Users | RoutePolicy::Studios => 100,
            RoutePolicy::Strict => 30,
            RoutePolicy::Relaxed => 300,
            RoutePolicy::Projects => 150,
            RoutePolicy::Search => 50,
            RoutePolicy::Thumbnails | RoutePolicy::Avatars => 200,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RoutePolicy::Projects => "Too many project API requests, please try again later",
            RoutePolicy::Users => "Too many user API requests, please try again later",
            RoutePolicy::Search => "Too many search API requests, please try again later",
            RoutePolicy::Thumbnails => "Too many thumbnail API requests, please try again later",
            RoutePolicy::Avatars => "Too many avatar API requests, please try again later",
            RoutePolicy::Studios => "Too many studio API requests, please try again later",
            _ => "Too many requests, please try again later",
        }
    }

    /// A limiter with this preset, counting under `{name}:{identity}`.
    pub fn builder(&self) -> LimiterBuilder {
        LimiterBuilder::new(self.name(), self.window())
            .max(self.max())
            .message(self.message())
    }
}

// == Registry ==
/// Every limiter the gateway enforces.
#[derive(Debug)]
pub struct LimiterRegistry {
    enabled: bool,
    global: Arc<FixedWindowLimiter>,
    routes: Vec<(RoutePolicy, Arc<FixedWindowLimiter>)>,
    user: Arc<DynamicLimiter>,
}

impl LimiterRegistry {
    /// Builds the global limiter (every path except `/health`), one limiter
    /// per route group and the per-user limiter.
    ///
    /// Trusted addresses bypass all of them.
    pub fn new(config: &RateLimitConfig, clock: SharedClock) -> Result<Self> {
        let trusted: Arc<[IpAddr]> = config.trusted_ips.clone().into();
        let is_trusted = move |request: &RequestMeta| {
            request
                .remote_addr
                .is_some_and(|addr| trusted.contains(&addr))
        };

        let global = {
            let is_trusted = is_trusted.clone();
            RoutePolicy::Default
                .builder()
                .skip(move |request| request.path == "/health" || is_trusted(request))
                .max_keys(config.max_tracked_keys)
                .clock(Arc::clone(&clock))
                .build_fixed()?
        };

        let routes = RoutePolicy::ROUTES
            .into_iter()
            .map(|policy| {
                let is_trusted = is_trusted.clone();
                policy
                    .builder()
                    .skip(is_trusted)
                    .max_keys(config.max_tracked_keys)
                    .clock(Arc::clone(&clock))
                    .build_fixed()
                    .map(|limiter| (policy, Arc::new(limiter)))
            })
            .collect::<Result<Vec<_>>>()?;

        let (anonymous, identified) = (config.anonymous_limit, config.identified_limit);
        let user = LimiterBuilder::new("user", config.user_window)
            .key_prefix(USER_KEY_PREFIX)
            .key_fn(|request| user_identity(request).to_string())
            .limit_fn(move |request| {
                if request.user_id.is_some() {
                    identified
                } else {
                    anonymous
                }
            })
            .skip(is_trusted)
            .message("Your requests are too frequent, please try again later")
            .max_keys(config.max_tracked_keys)
            .clock(clock)
            .build_dynamic()?;

        Ok(Self {
            enabled: config.enabled,
            global: Arc::new(global),
            routes,
            user: Arc::new(user),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn global(&self) -> Arc<dyn Limiter> {
        Arc::clone(&self.global) as Arc<dyn Limiter>
    }

    pub fn route(&self, policy: RoutePolicy) -> Option<Arc<dyn Limiter>> {
        self.routes
            .iter()
            .find(|(candidate, _)| *candidate == policy)
            .map(|(_, limiter)| Arc::clone(limiter) as Arc<dyn Limiter>)
    }

    pub fn user(&self) -> Arc<dyn Limiter> {
        Arc::clone(&self.user) as Arc<dyn Limiter>
    }

    /// Forgets the per-user counter of `user` (`anonymous` for callers without an id).
    pub fn reset_user(&self, user: &str) -> bool {
        self.user.reset(user)
    }

    /// Global, route and user limiters, in that order.
    pub fn all(&self) -> Vec<Arc<dyn Limiter>> {
        let mut all = vec![self.global()];
        all.extend(
            self.routes
                .iter()
                .map(|(_, limiter)| Arc::clone(limiter) as Arc<dyn Limiter>),
        );
        all.push(self.user());
        all
    }

    pub fn stats(&self) -> Vec<LimiterStats> {
        self.all().iter().map(|limiter| limiter.stats()).collect()
    }

    pub fn sweep_targets(&self) -> Vec<Arc<dyn Sweep>> {
        self.all().iter().map(|limiter| limiter.sweep_target()).collect()
    }
}

/// User id a request is counted under by the per-user limiter.
pub fn user_identity(request: &RequestMeta) -> &str {
    request.user_id.as_deref().unwrap_or("anonymous")
}
