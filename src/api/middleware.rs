//! Rate-Limit Middleware
//!
//! Runs a [`Limiter`] in front of a route and maps its [`Decision`] to HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::ratelimit::{Decision, Limiter, RateLimitInfo, RequestMeta};

/// Header carrying the caller's user id for the per-user limiter.
pub const USER_ID_HEADER: &str = "x-user-id";

const LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// What the limiters get to see of a request.
pub fn request_meta(request: &Request) -> RequestMeta {
    RequestMeta {
        remote_addr: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip()),
        path: request.uri().path().to_string(),
        user_id: request
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    }
}

/// Middleware enforcing `limiter`.
///
/// Allowed and rejected responses carry the quota headers; rejections are
/// answered with 429 and `Retry-After` without reaching the handler. When
/// several limiters are stacked the innermost one's headers are kept.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<dyn Limiter>>,
    request: Request,
    next: Next,
) -> Response {
    let decision = limiter.check(&request_meta(&request));
    match decision {
        Decision::Bypassed => next.run(request).await,
        Decision::Allowed(info) => {
            let mut response = next.run(request).await;
            quota_headers(response.headers_mut(), &info);
            response
        }
        Decision::Rejected(rejection) => {
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(rejection.body)).into_response();
            let headers = response.headers_mut();
            quota_headers(headers, &rejection.info);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(rejection.retry_after_secs));
            response
        }
    }
}

fn quota_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    if headers.contains_key(&LIMIT) {
        return;
    }
    headers.insert(LIMIT, HeaderValue::from(info.limit));
    headers.insert(REMAINING, HeaderValue::from(info.remaining));
    headers.insert(RESET, HeaderValue::from(info.reset_epoch_secs()));
}
