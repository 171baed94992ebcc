//! API Routes
//!
//! Configures the Axum router with all gateway endpoints and limiters.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    avatar_handler, explore_handler, featured_handler, health_handler, invalidate_all_handler,
    invalidate_handler, news_handler, project_handler, project_source_handler, remixes_handler,
    reset_user_limit_handler, search_handler, stats_handler, studio_curators_handler, studio_handler,
    studio_managers_handler, studio_projects_handler, thumbnail_handler, user_favorites_handler,
    user_followers_handler, user_following_handler, user_handler, user_projects_handler, AppState,
};
use super::middleware::enforce_rate_limit;
use crate::ratelimit::{Limiter, RoutePolicy};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health`, `GET /stats`
/// - `DELETE /cache`, `DELETE /cache/:category`
/// - `DELETE /ratelimit/users/:user`
/// - `GET /api/...` resource routes, each behind its route-group limiter
///   and the per-user limiter; `/api/proxy/featured` uses the strict preset
///   and `/api/news` the relaxed one
///
/// Every route except `/health` also goes through the global limiter. With
/// rate limiting disabled no limiter is installed.
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let limits = state.limiters.enabled().then(|| Arc::clone(&state.limiters));
    let guard = |router: Router<AppState>, limiter: Option<Arc<dyn Limiter>>| match limiter {
        Some(limiter) => router.route_layer(middleware::from_fn_with_state(limiter, enforce_rate_limit)),
        None => router,
    };
    let route = |policy: RoutePolicy| limits.as_ref().and_then(|limits| limits.route(policy));

    let api = Router::new()
        .merge(guard(
            Router::new()
                .route("/users/:username", get(user_handler))
                .route("/users/:username/projects", get(user_projects_handler))
                .route("/users/:username/favorites", get(user_favorites_handler))
                .route("/users/:username/following", get(user_following_handler))
                .route("/users/:username/followers", get(user_followers_handler)),
            route(RoutePolicy::Users),
        ))
        .merge(guard(
            Router::new()
                .route("/projects/:id", get(project_handler))
                .route("/projects/:id/remixes", get(remixes_handler))
                .route("/projects/source/:id", get(project_source_handler)),
            route(RoutePolicy::Projects),
        ))
        .merge(guard(
            Router::new()
                .route("/search/projects", get(search_handler))
                .route("/explore/projects", get(explore_handler)),
            route(RoutePolicy::Search),
        ))
        .merge(guard(
            Router::new()
                .route("/studios/:id", get(studio_handler))
                .route("/studios/:id/projects", get(studio_projects_handler))
                .route("/studios/:id/managers", get(studio_managers_handler))
                .route("/studios/:id/curators", get(studio_curators_handler)),
            route(RoutePolicy::Studios),
        ))
        .merge(guard(
            Router::new().route("/thumbnails/:id", get(thumbnail_handler)),
            route(RoutePolicy::Thumbnails),
        ))
        .merge(guard(
            Router::new().route("/avatars/:id", get(avatar_handler)),
            route(RoutePolicy::Avatars),
        ))
        .merge(guard(
            Router::new().route("/proxy/featured", get(featured_handler)),
            route(RoutePolicy::Strict),
        ))
        .merge(guard(
            Router::new().route("/news", get(news_handler)),
            route(RoutePolicy::Relaxed),
        ));
    let api = guard(api, limits.as_ref().map(|limits| limits.user()));

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/cache", delete(invalidate_all_handler))
        .route("/cache/:category", delete(invalidate_handler))
        .route("/ratelimit/users/:user", delete(reset_user_limit_handler))
        .nest("/api", api);

    guard(app, limits.as_ref().map(|limits| limits.global()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, Params, Payload};
    use crate::clock::ManualClock;
    use crate::config::{CacheConfig, RateLimitConfig};
    use crate::error::{GatewayError, Result};
    use crate::ratelimit::LimiterRegistry;
    use crate::upstream::{Origin, Upstream};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    struct MissingUpstream;

    #[async_trait]
    impl Upstream for MissingUpstream {
        async fn fetch(&self, _: Origin, _: &str, _: &Params) -> Result<Payload> {
            Err(GatewayError::upstream(404, "Not Found"))
        }
    }

    fn create_test_app(rate_limit: RateLimitConfig) -> Router {
        let clock = ManualClock::new(0).shared();
        let state = AppState::new(
            CacheManager::new(&CacheConfig::default(), Arc::clone(&clock)).unwrap(),
            Arc::new(MissingUpstream),
            LimiterRegistry::new(&rate_limit, clock).unwrap(),
        );
        create_router(state)
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint_has_no_quota_headers() {
        let response = get(create_test_app(RateLimitConfig::default()), "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_stats_endpoint_uses_global_limiter() {
        let response = get(create_test_app(RateLimitConfig::default()), "/stats").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
    }

    #[tokio::test]
    async fn test_route_limiter_headers_win() {
        let response = get(create_test_app(RateLimitConfig::default()), "/api/search/projects").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-ratelimit-limit"], "50");
    }

    #[tokio::test]
    async fn test_disabled_rate_limiting_installs_nothing() {
        let app = create_test_app(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        });
        let response = get(app, "/api/projects/1").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_proxy_and_news_use_strict_and_relaxed_presets() {
        let app = create_test_app(RateLimitConfig::default());

        let response = get(app.clone(), "/api/proxy/featured").await;
        assert_eq!(response.headers()["x-ratelimit-limit"], "30");

        let response = get(app, "/api/news").await;
        assert_eq!(response.headers()["x-ratelimit-limit"], "300");
    }

    #[tokio::test]
    async fn test_listing_routes_share_group_limiter() {
        let app = create_test_app(RateLimitConfig::default());

        let response = get(app.clone(), "/api/users/bob/followers").await;
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "99");

        let response = get(app.clone(), "/api/users/bob").await;
        assert_eq!(response.headers()["x-ratelimit-remaining"], "98");

        let response = get(app, "/api/projects/source/12").await;
        assert_eq!(response.headers()["x-ratelimit-limit"], "150");
    }

    #[tokio::test]
    async fn test_bad_id_is_400() {
        let response = get(create_test_app(RateLimitConfig::default()), "/api/projects/abc").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
