//! Request DTOs for the gateway API
//!
//! Query strings accepted by the listing endpoints.

use serde::Deserialize;

use crate::cache::Params;

/// Largest page the upstream serves.
pub const MAX_PAGE_SIZE: u32 = 40;

fn default_limit() -> u32 {
    16
}

fn default_language() -> String {
    "zh-cn".to_string()
}

fn default_mode() -> String {
    "popular".to_string()
}

fn default_query() -> String {
    "*".to_string()
}

/// Query for `GET /api/search/projects` and `GET /api/explore/projects`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_query")]
    pub q: String,
    #[serde(default)]
    pub offset: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            language: default_language(),
            mode: default_mode(),
            q: default_query(),
            offset: 0,
        }
    }
}

impl ListQuery {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_limit(self.limit)
    }

    /// Upstream query parameters, which are also the cache key parameters.
    pub fn to_params(&self) -> Params {
        Params::new()
            .with("limit", self.limit)
            .with("language", &self.language)
            .with("mode", &self.mode)
            .with("q", &self.q)
            .with("offset", self.offset)
    }
}

/// Query for paged listings such as `GET /api/projects/:id/remixes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PageQuery {
    pub fn validate(&self) -> Option<String> {
        validate_limit(self.limit)
    }

    pub fn to_params(&self) -> Params {
        Params::new().with("limit", self.limit).with("offset", self.offset)
    }
}

/// Query for `GET /api/projects/source/:id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceQuery {
    /// Access token issued with the project metadata
    pub token: Option<String>,
}

impl SourceQuery {
    pub fn to_params(&self) -> Params {
        self.token
            .iter()
            .map(|token| ("token", token.as_str()))
            .collect()
    }
}

fn validate_limit(limit: u32) -> Option<String> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Some(format!("limit must be between 1 and {MAX_PAGE_SIZE}"));
    }
    None
}
