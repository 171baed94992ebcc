//! API Module
//!
//! HTTP handlers, rate-limit middleware and routing for the gateway.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache and limiter statistics
//! - `DELETE /cache`, `DELETE /cache/:category` - Invalidate caches
//! - `DELETE /ratelimit/users/:user` - Reset a per-user counter
//! - `GET /api/...` - Cached upstream resources

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::*;
pub use middleware::{enforce_rate_limit, request_meta, USER_ID_HEADER};
pub use routes::create_router;
