//! Resource Store - bounded TTL cache for proxied origin resources
//!
//! One store is created per asset class at startup and shared by every
//! request for that class. The store knows nothing about HTTP: it maps a
//! storage key to a [`CachedResource`] and enforces two limits.
//!
//! - **TTL**: entries older than the class TTL are stale. Stale entries stay
//!   readable (so the proxy can offer their ETag for revalidation) until a
//!   sweep removes them.
//! - **Bound**: after an insertion pushes the store past `max_entries`, expired
//!   entries are swept first, then the oldest entries by `stored_at` until the
//!   store is back at the bound.
//!
//! ```text
//!   put(k) ──► insert ──► len > max? ──no──► done
//!                             │yes
//!                             ▼
//!                  evict_expired(ttl) ──► len > max? ──yes──► evict oldest
//! ```
//!
//! Reads never touch `stored_at`; only a successful revalidation does
//! (see [`ResourceStore::touch`]).

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for one asset-class store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Asset class name, used in logs
    pub name: String,
    /// Freshness window
    pub ttl: Duration,
    /// Maximum number of entries kept after a sweep
    pub max_entries: usize,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            name: name.into(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }
}

// ============================================================================
// Cached Resource
// ============================================================================

/// A resource fetched from an origin, as held by the store
#[derive(Debug, Clone)]
pub struct CachedResource {
    /// Payload (never empty)
    pub bytes: Bytes,
    /// Content type reported or detected for the payload
    pub content_type: Option<String>,
    /// Origin validator for conditional revalidation
    pub etag: Option<String>,
    /// Last successful fetch or revalidation
    pub stored_at: Instant,
}

impl CachedResource {
    /// Create a resource stamped with the current time
    pub fn new(bytes: Bytes, content_type: Option<String>, etag: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
            etag,
            stored_at: Instant::now(),
        }
    }

    /// Time since the last successful fetch or revalidation
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Fresh means strictly younger than `ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    /// Same payload, restamped now
    pub fn refreshed(&self) -> Self {
        Self {
            stored_at: Instant::now(),
            ..self.clone()
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Store entry with insertion sequence (breaks `stored_at` ties)
struct StoreEntry {
    resource: CachedResource,
    seq: u64,
}

// ============================================================================
// Statistics
// ============================================================================

/// Point-in-time view of a store
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub max_entries: usize,
    pub total_bytes: u64,
    pub ttl_secs: u64,
    /// Entries removed because the store was over its bound
    pub evictions: u64,
    /// Entries removed because they outlived the TTL
    pub expirations: u64,
}

// ============================================================================
// Resource Store
// ============================================================================

/// Bounded, TTL-aware resource store.
///
/// Thread-safe: `get`/`put`/`touch` may be called from any task concurrently.
/// An entry becomes visible to readers only once fully constructed, since the
/// map stores whole entries.
pub struct ResourceStore {
    entries: DashMap<String, StoreEntry>,
    next_seq: AtomicU64,
    total_bytes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    /// Serializes bound enforcement so concurrent puts do not over-evict
    sweep_lock: Mutex<()>,
    config: StoreConfig,
}

impl ResourceStore {
    /// Create a new store
    pub fn new(config: StoreConfig) -> Self {
        info!(
            class = %config.name,
            ttl_secs = config.ttl.as_secs(),
            max_entries = config.max_entries,
            "ResourceStore initialized"
        );

        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            sweep_lock: Mutex::new(()),
            config,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry, fresh or stale. O(1), no side effects.
    pub fn get(&self, key: &str) -> Option<CachedResource> {
        self.entries.get(key).map(|entry| entry.resource.clone())
    }

    /// Insert or replace an entry, then enforce the bound.
    ///
    /// Empty payloads are refused; returns whether the entry was stored.
    pub fn put(&self, key: &str, resource: CachedResource) -> bool {
        if resource.bytes.is_empty() {
            warn!(class = %self.config.name, key = key, "Refusing to cache empty resource");
            return false;
        }

        let size = resource.size() as u64;
        let entry = StoreEntry {
            resource,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            self.total_bytes
                .fetch_sub(old.resource.size() as u64, Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        debug!(class = %self.config.name, key = key, size = size, "Resource cached");

        if self.entries.len() > self.config.max_entries {
            self.enforce_bound();
        }

        true
    }

    /// Restamp an existing entry after a successful revalidation.
    ///
    /// Returns false if the entry is gone (evicted since it was read).
    pub fn touch(&self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.resource.stored_at = Instant::now();
                entry.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Remove entries with `now - stored_at > ttl`. Returns how many were removed.
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        // Snapshot first, then remove; never mutate while iterating
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.resource.age() > ttl)
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0usize;
        let mut freed = 0u64;
        for key in &expired {
            // Re-check: the entry may have been replaced or restamped meanwhile
            if let Some((_, entry)) = self.entries.remove_if(key, |_, e| e.resource.age() > ttl) {
                removed += 1;
                freed += entry.resource.size() as u64;
            }
        }

        if removed > 0 {
            self.total_bytes.fetch_sub(freed, Ordering::Relaxed);
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(class = %self.config.name, removed = removed, "Expired entries swept");
        }

        removed
    }

    /// Bring the store back to `max_entries`: expired first, then oldest.
    fn enforce_bound(&self) {
        let _guard = self.sweep_lock.lock().unwrap_or_else(|e| e.into_inner());

        self.evict_expired(self.config.ttl);

        let len = self.entries.len();
        if len <= self.config.max_entries {
            return;
        }

        // Collect entries sorted by stored_at (oldest first), insertion order on ties
        let mut entries: Vec<(String, Instant, u64)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.resource.stored_at, e.seq))
            .collect();
        entries.sort_by_key(|(_, stored_at, seq)| (*stored_at, *seq));

        let mut to_remove = len - self.config.max_entries;
        let mut freed = 0u64;
        let mut evicted = 0u64;

        for (key, _, seq) in entries {
            if to_remove == 0 {
                break;
            }
            // Skip entries rewritten since the snapshot
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, e| e.seq == seq) {
                freed += entry.resource.size() as u64;
                evicted += 1;
                to_remove -= 1;
            }
        }

        self.total_bytes.fetch_sub(freed, Ordering::Relaxed);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        debug!(
            class = %self.config.name,
            evicted = evicted,
            freed = freed,
            "Evicted oldest entries to respect bound"
        );
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.entries.len(),
            max_entries: self.config.max_entries,
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            ttl_secs: self.config.ttl.as_secs(),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Background Cleanup Task
// ============================================================================

/// Spawn a background task to periodically sweep expired entries
pub fn spawn_cleanup_task(store: Arc<ResourceStore>, interval: Duration) {
    let name = store.config().name.clone();

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let expired = store.evict_expired(store.ttl());
            let stats = store.stats();
            debug!(
                class = %store.config().name,
                expired = expired,
                entries = stats.entries,
                bytes = stats.total_bytes,
                "Store cleanup completed"
            );
        }
    });

    info!(
        class = %name,
        interval_secs = interval.as_secs(),
        "Store cleanup task started"
    );
}

// ============================================================================
// Tests
// ============================================================================
