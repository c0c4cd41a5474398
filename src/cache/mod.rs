//! In-memory caching for proxied resources
//!
//! - `store`: bounded TTL store, one per asset class
//! - `keys`: source + URL cache keys
//! - `stats`: per-class request counters

pub mod keys;
pub mod stats;
pub mod store;

pub use keys::{CacheKey, DEFAULT_SOURCE};
pub use stats::{Outcome, RequestStats, StatsSnapshot};
pub use store::{spawn_cleanup_task, CachedResource, ResourceStore, StoreConfig, StoreStats};
