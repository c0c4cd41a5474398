//! Cache key definitions
//!
//! Keys are scoped to one asset class; each proxy owns its own store so
//! keys from different classes never meet.

use std::fmt;

/// Source id used when the request names no source
pub const DEFAULT_SOURCE: &str = "default";

/// Cache key for a proxied origin resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Source or channel identifier the request was made for
    pub source: String,
    /// Decoded origin URL
    pub url: String,
}

impl CacheKey {
    /// Create a new cache key. An empty source collapses to [`DEFAULT_SOURCE`].
    pub fn new(source: Option<&str>, url: &str) -> Self {
        let source = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SOURCE);

        Self {
            source: source.to_string(),
            url: url.to_string(),
        }
    }

    /// Convert to storage key string
    /// Format: source|url
    pub fn to_storage_key(&self) -> String {
        format!("{}|{}", self.source, self.url)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.url)
    }
}
