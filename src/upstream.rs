//! Upstream Module
//!
//! The origin the gateway fronts. Handlers only see the [`Upstream`] trait so
//! tests can swap in a stub.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use tracing::{debug, error};

use crate::cache::{Params, Payload};
use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};

/// Status reported when the upstream could not be reached at all.
const UNREACHABLE: u16 = 503;

// == Origin ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// JSON API
    Api,
    /// Uploaded assets (thumbnails, avatars)
    Uploads,
    /// Project sources
    Projects,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Api => "api",
            Origin::Uploads => "uploads",
            Origin::Projects => "projects",
        })
    }
}

// == Upstream ==
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetches `path` (relative to the origin's base URL) with `query`.
    async fn fetch(&self, origin: Origin, path: &str, query: &Params) -> Result<Payload>;
}

// == HTTP Upstream ==
/// [`Upstream`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    api_url: String,
    uploads_url: String,
    projects_url: String,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: with_trailing_slash(&config.api_url),
            uploads_url: with_trailing_slash(&config.uploads_url),
            projects_url: with_trailing_slash(&config.projects_url),
        })
    }

    fn url(&self, origin: Origin, path: &str) -> String {
        let base = match origin {
            Origin::Api => &self.api_url,
            Origin::Uploads => &self.uploads_url,
            Origin::Projects => &self.projects_url,
        };
        format!("{base}{}", path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, origin: Origin, path: &str, query: &Params) -> Result<Payload> {
        let url = self.url(origin, path);
        debug!(%origin, %url, "Fetching from upstream");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json, image/*, */*"))
            .query(query.as_slice())
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "Upstream request failed");
                GatewayError::upstream(e.status().map_or(UNREACHABLE, |s| s.as_u16()), e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(%url, status = status.as_u16(), "Upstream returned an error status");
            return Err(GatewayError::upstream(
                status.as_u16(),
                status.canonical_reason().unwrap_or("upstream error"),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response.bytes().await.map_err(|e| {
            error!(%url, error = %e, "Failed to read upstream body");
            GatewayError::upstream(status.as_u16(), e.to_string())
        })?;

        decode(content_type, bytes)
    }
}

/// Turns an upstream body into a [`Payload`] according to its content type.
fn decode(content_type: String, bytes: axum::body::Bytes) -> Result<Payload> {
    if content_type.starts_with("application/json") {
        return serde_json::from_slice(&bytes)
            .map(Payload::Json)
            .map_err(|e| GatewayError::upstream(502, format!("invalid JSON from upstream: {e}")));
    }
    if content_type.starts_with("text/") {
        return Ok(Payload::Text(String::from_utf8_lossy(&bytes).into_owned()));
    }
    Ok(Payload::Binary { content_type, bytes })
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use serde_json::json;

    #[test]
    fn test_url_joins_base_and_path() {
        let upstream = HttpUpstream::new(&UpstreamConfig {
            api_url: "https://api.example.test".into(),
            ..UpstreamConfig::default()
        })
        .unwrap();

        assert_eq!(upstream.url(Origin::Api, "/users/bob/"), "https://api.example.test/users/bob/");
        assert_eq!(
            upstream.url(Origin::Uploads, "projects/thumbnails/1.png"),
            "https://uploads.scratch.mit.edu/projects/thumbnails/1.png"
        );
        assert_eq!(upstream.url(Origin::Projects, "123"), "https://projects.scratch.mit.edu/123");
    }

    #[test]
    fn test_decode_by_content_type() {
        let json_body = decode("application/json; charset=utf-8".into(), r#"{"id":1}"#.into()).unwrap();
        assert_eq!(json_body, Payload::Json(json!({"id": 1})));

        let text = decode("text/plain".into(), "hello".into()).unwrap();
        assert_eq!(text, Payload::Text("hello".into()));

        let image = decode("image/png".into(), vec![0x89, 0x50].into()).unwrap();
        assert!(matches!(image, Payload::Binary { ref content_type, .. } if content_type == "image/png"));
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        let err = decode("application/json".into(), "{nope".into()).unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: 502, .. }));
    }
}
