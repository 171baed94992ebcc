//! Cache Module
//!
//! In-memory caching with TTL expiration, least-recently-accessed eviction,
//! and a manager that keeps one named cache per resource category.

mod category;
mod entry;
mod fanout;
mod key;
mod manager;
mod named;
mod payload;
mod recency;
mod stats;
mod store;


// Re-export public types
pub use category::Category;
pub use entry::CacheEntry;
pub use fanout::{extract_sub_entities, Contents, ExtractError, SubEntity};
pub use key::{cache_key, is_valid_username, username_id, Params, MAX_USERNAME_LEN};
pub use manager::{CacheManager, ComputeMode};
pub use named::NamedCache;
pub use payload::Payload;
pub use recency::RecencyIndex;
pub use stats::CacheStats;
pub use store::TtlCache;
