//! Resource categories, one named cache each.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Users,
    Projects,
    Studios,
    Thumbnails,
    Avatars,
    Search,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Users,
        Category::Projects,
        Category::Studios,
        Category::Thumbnails,
        Category::Avatars,
        Category::Search,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Users => "users",
            Category::Projects => "projects",
            Category::Studios => "studios",
            Category::Thumbnails => "thumbnails",
            Category::Avatars => "avatars",
            Category::Search => "search",
        }
    }

    /// Leading segment of every key stored in this category.
    pub fn key_prefix(self) -> &'static str {
        match self {
            Category::Users => "user",
            Category::Projects => "project",
            Category::Studios => "studio",
            Category::Thumbnails => "thumbnail",
            Category::Avatars => "avatar",
            Category::Search => "search",
        }
    }

    pub fn default_ttl(self) -> Duration {
        let secs = match self {
            Category::Users | Category::Studios => 3600,
            Category::Projects => 1800,
            Category::Thumbnails | Category::Avatars => 7200,
            Category::Search => 600,
        };
        Duration::from_secs(secs)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unknown cache category '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_all_order() {
        for (i, category) in Category::ALL.into_iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("nope".parse::<Category>().is_err());
    }
}
