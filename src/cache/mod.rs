//! Bookshelf response cache.
//!
//! Paginated list responses are cached as serialized payloads under keys
//! derived from the query shape. Every entry carries tags naming the
//! resource types its payload embeds; writers invalidate the tag of the
//! resource they modified.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! producer_timeout_ms = 5000
//! ```

mod config;
mod keys;
mod registry;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKey, CacheTag, ResourceKind, UnknownTag};
pub use registry::{EpochSnapshot, TagRegistry};
pub use store::{CacheError, CacheStats, TagCache, TagStats};
