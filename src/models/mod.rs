//! Request and Response models for the gateway API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP query strings and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{ListQuery, PageQuery, SourceQuery, MAX_PAGE_SIZE};
pub use responses::{ErrorResponse, HealthResponse, InvalidateResponse, LimitResetResponse, StatsResponse};
