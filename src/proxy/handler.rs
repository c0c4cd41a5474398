//! Resource Proxy Handler - fetch-through cache for one asset class
//!
//! ```text
//!   request ──► store.get ──fresh──► HIT
//!                  │stale/absent
//!                  ▼
//!            fetch (If-None-Match: cached etag)
//!              │304            │200               │error
//!              ▼               ▼                  ▼
//!          touch entry     policy.accept      typed error
//!          304-HIT         store.put, MISS    (never stale bytes)
//! ```
//!
//! A stale entry is always offered for revalidation, but when the origin
//! fails the failure is surfaced: keys and logos must not be served past
//! their freshness window on the strength of a cached copy.
//!
//! Concurrent misses for the same key each fetch; the last `put` wins.

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheKey, CachedResource, Outcome, RequestStats, ResourceStore, StatsSnapshot, StoreConfig,
    StoreStats,
};
use crate::origin::{FetchOutcome, FetchRequest, OriginFetcher};
use crate::proxy::policy::AssetPolicy;
use crate::sources::SourceRegistry;
use crate::types::{RelayError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Tuning for one asset class
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Freshness window
    pub ttl: Duration,
    /// Store bound
    pub max_entries: usize,
    /// Hard deadline per origin fetch
    pub timeout: Duration,
    /// Sweep expired entries every N requests
    pub sweep_every: u64,
    /// Log a stats line every N requests
    pub stats_log_every: u64,
}

impl ProxyConfig {
    /// Decryption keys: rotate often
    pub fn keys() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_entries: 1000,
            timeout: Duration::from_secs(10),
            sweep_every: 100,
            stats_log_every: 100,
        }
    }

    /// Channel logos: near-static
    pub fn logos() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_entries: 500,
            timeout: Duration::from_secs(15),
            sweep_every: 100,
            stats_log_every: 100,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Cache provenance of a served response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    RevalidatedHit,
}

impl CacheStatus {
    /// Value of the `X-Cache` header
    pub fn header_value(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::RevalidatedHit => "304-HIT",
        }
    }

    fn outcome(&self) -> Outcome {
        match self {
            CacheStatus::Hit => Outcome::Hit,
            CacheStatus::Miss => Outcome::Miss,
            CacheStatus::RevalidatedHit => Outcome::RevalidatedHit,
        }
    }
}

/// Bytes and metadata handed to the HTTP layer
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub bytes: Bytes,
    pub content_type: String,
    pub etag: String,
    pub cache_control: &'static str,
    pub cache_status: CacheStatus,
}

/// Stats and store view for one class
#[derive(Debug, Clone, Serialize)]
pub struct ProxySnapshot {
    pub class: &'static str,
    pub stats: StatsSnapshot,
    pub store: StoreStats,
}

// ============================================================================
// Resource Proxy
// ============================================================================

/// Fetch-through proxy for one asset class
pub struct ResourceProxy {
    policy: Box<dyn AssetPolicy>,
    store: Arc<ResourceStore>,
    stats: RequestStats,
    fetcher: Arc<OriginFetcher>,
    sources: Arc<dyn SourceRegistry>,
    config: ProxyConfig,
    handled: AtomicU64,
}

impl ResourceProxy {
    /// Create a proxy with its own store
    pub fn new(
        policy: impl AssetPolicy + 'static,
        config: ProxyConfig,
        fetcher: Arc<OriginFetcher>,
        sources: Arc<dyn SourceRegistry>,
    ) -> Self {
        let store = Arc::new(ResourceStore::new(StoreConfig::new(
            policy.name(),
            config.ttl,
            config.max_entries,
        )));

        info!(
            class = policy.name(),
            ttl_secs = config.ttl.as_secs(),
            timeout_ms = config.timeout.as_millis() as u64,
            "ResourceProxy initialized"
        );

        Self {
            policy: Box::new(policy),
            store,
            stats: RequestStats::new(),
            fetcher,
            sources,
            config,
            handled: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Shared handle to the class store (for the cleanup task)
    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn snapshot(&self) -> ProxySnapshot {
        ProxySnapshot {
            class: self.name(),
            stats: self.stats.snapshot(),
            store: self.store.stats(),
        }
    }

    /// Serve one request. Records stats for every outcome.
    pub async fn handle(&self, url: Option<&str>, source: Option<&str>) -> Result<ProxyResponse> {
        let started = Instant::now();
        let result = self.serve(url, source).await;

        let (outcome, served) = match &result {
            Ok(response) => (response.cache_status.outcome(), response.bytes.len()),
            Err(_) => (Outcome::Error, 0),
        };
        self.stats.record(outcome, started.elapsed(), served);
        self.after_request();

        result
    }

    async fn serve(&self, url: Option<&str>, source: Option<&str>) -> Result<ProxyResponse> {
        // Cheap checks first: no network for bad input
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(RelayError::MissingParameter("url"))?;
        OriginFetcher::parse_url(url)?;
        let user_agent = self
            .sources
            .resolve(source, self.policy.strict_source())?;

        let key = CacheKey::new(source, url).to_storage_key();
        let cached = self.store.get(&key);

        if let Some(ref entry) = cached {
            if entry.is_fresh(self.config.ttl) {
                debug!(class = self.name(), key = %key, "Cache hit");
                return Ok(self.respond(entry, CacheStatus::Hit));
            }
        }

        let request = FetchRequest {
            url,
            user_agent: &user_agent,
            etag: cached.as_ref().and_then(|c| c.etag.as_deref()),
            timeout: self.config.timeout,
            max_bytes: self.policy.max_bytes(),
        };

        let outcome = self.fetcher.fetch(&request).await.map_err(|e| {
            warn!(class = self.name(), url = url, error = %e, "Origin fetch failed");
            RelayError::from(e)
        })?;

        match outcome {
            FetchOutcome::NotModified => {
                let Some(entry) = cached else {
                    return Err(RelayError::Internal(
                        "origin answered 304 to an unconditional request".to_string(),
                    ));
                };
                // Entry may have been evicted while we were revalidating
                if !self.store.touch(&key) {
                    self.store.put(&key, entry.refreshed());
                }
                debug!(class = self.name(), key = %key, "Revalidated with origin (304)");
                Ok(self.respond(&entry, CacheStatus::RevalidatedHit))
            }
            FetchOutcome::Fetched(fetched) => {
                let content_type = self.policy.accept(&fetched).map_err(|e| {
                    warn!(class = self.name(), url = url, error = %e, "Origin payload rejected");
                    e
                })?;

                let resource = CachedResource::new(fetched.body, Some(content_type), fetched.etag);
                self.store.put(&key, resource.clone());

                info!(
                    class = self.name(),
                    url = url,
                    size = resource.size(),
                    "Fetched and cached from origin"
                );
                Ok(self.respond(&resource, CacheStatus::Miss))
            }
        }
    }

    fn respond(&self, resource: &CachedResource, cache_status: CacheStatus) -> ProxyResponse {
        ProxyResponse {
            bytes: resource.bytes.clone(),
            content_type: resource
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            etag: resource
                .etag
                .clone()
                .unwrap_or_else(|| content_etag(&resource.bytes)),
            cache_control: self.policy.cache_control(),
            cache_status,
        }
    }

    /// Opportunistic sweep and periodic stats line
    fn after_request(&self) {
        let n = self.handled.fetch_add(1, Ordering::Relaxed) + 1;

        if self.config.sweep_every > 0 && n % self.config.sweep_every == 0 {
            self.store.evict_expired(self.config.ttl);
        }

        if self.config.stats_log_every > 0 && n % self.config.stats_log_every == 0 {
            let s = self.stats.snapshot();
            info!(
                class = self.name(),
                requests = s.requests,
                errors = s.errors,
                cache_hits = s.cache_hits,
                hit_rate = format!("{:.1}%", s.hit_rate()),
                total_bytes = s.total_bytes,
                avg_ms = format!("{:.1}", s.avg_response_time_ms),
                entries = self.store.len(),
                "Proxy stats"
            );
        }
    }
}

/// Quoted validator derived from content, for origins that send no ETag
pub fn content_etag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("\"{}\"", hex::encode(&digest[..8]))
}
