//! Cached payload type.

use axum::{
    body::Bytes,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

/// An upstream response as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Binary { content_type: String, bytes: Bytes },
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl IntoResponse for Payload {
    fn into_response(self) -> Response {
        match self {
            Payload::Json(value) => Json(value).into_response(),
            Payload::Text(text) => text.into_response(),
            Payload::Binary {
                content_type,
                bytes,
            } => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        }
    }
}
