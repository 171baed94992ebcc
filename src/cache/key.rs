//! Cache Key Module
//!
//! Deterministic composite keys: `kind:id`, followed by `:name=value&...`
//! when auxiliary parameters are present.

use std::fmt::Display;

// == Params ==
/// Auxiliary request parameters, in whatever order the caller produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.0.push((name.into(), value.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.to_string()))
                .collect(),
        )
    }
}

// == Cache Key ==
/// Builds the cache key for `kind`/`id` and `params`.
///
/// Parameters are sorted by name (then value) before joining, so the same
/// set of parameters always yields the same key regardless of order.
pub fn cache_key(kind: &str, id: impl Display, params: &Params) -> String {
    let mut key = format!("{kind}:{id}");
    if params.is_empty() {
        return key;
    }

    let mut pairs: Vec<&(String, String)> = params.0.iter().collect();
    pairs.sort();

    let joined = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    key.push(':');
    key.push_str(&joined);
    key
}

// == User Identifiers ==
/// Longest username the gateway accepts.
pub const MAX_USERNAME_LEN: usize = 32;

/// Id a user is cached under in the users category.
///
/// Both the users route and fan-out store users by name, so a lookup by
/// username sees authors discovered in other payloads.
pub fn username_id(username: &str) -> String {
    format!("username:{username}")
}

/// Letters, digits, `_` and `-`, at most [`MAX_USERNAME_LEN`] characters.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_without_params() {
        assert_eq!(cache_key("project", 42, &Params::new()), "project:42");
    }

    #[test]
    fn test_key_is_order_independent() {
        let a = Params::new().with("b", 2).with("a", 1);
        let b = Params::new().with("a", 1).with("b", 2);

        assert_eq!(cache_key("search", "projects", &a), cache_key("search", "projects", &b));
        assert_eq!(cache_key("search", "projects", &a), "search:projects:a=1&b=2");
    }

    #[test]
    fn test_params_from_iterator() {
        let params: Params = [("offset", 0), ("limit", 16)].into_iter().collect();
        assert_eq!(cache_key("explore", "projects", &params), "explore:projects:limit=16&offset=0");
    }

    #[test]
    fn test_username_ids_never_collide_with_numeric_ids() {
        assert_eq!(username_id("12345"), "username:12345");
        assert_ne!(cache_key("user", username_id("12345"), &Params::new()), cache_key("user", 12345, &Params::new()));
    }

    #[test]
    fn test_username_validation() {
        assert!(is_valid_username("griffpatch"));
        assert!(is_valid_username("a-b_c9"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("../etc"));
        assert!(!is_valid_username("no id"));
        assert!(!is_valid_username(&"x".repeat(MAX_USERNAME_LEN + 1)));
    }
}
