//! Spider artifact provider - ordered candidate fallback
//!
//! The spider jar is fetched from a fixed, ordered list of mirrors. A
//! refresh walks the list: HEAD probe, then full GET, then a plausibility
//! check on the size. The first candidate that passes wins and is cached
//! for the provider TTL.
//!
//! When every candidate fails, the provider caches and serves a small
//! embedded jar instead. Clients of this artifact cannot render an error,
//! so the provider never returns one; the `success` and `source` fields
//! tell operators whether the real artifact is being served.
//!
//! Refreshes are single-flight: concurrent callers that find the cache
//! expired wait for one probing pass instead of each walking the list.

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::origin::{FetchOutcome, FetchRequest, OriginFetcher};
use crate::types::{RelayError, Result};

/// `source` value of an entry built from the embedded artifact
pub const FALLBACK_SOURCE: &str = "fallback";

/// Smallest body accepted as a real artifact (anything smaller is an error page)
pub const DEFAULT_MIN_ARTIFACT_BYTES: usize = 1000;

/// Embedded stand-in jar: a valid archive holding only a manifest
const FALLBACK_JAR_B64: &str = "UEsDBBQAAAAIAAAAIVhbNsxLSwAAAEkAAAAUAAAATUVUQS1JTkYvTUFOSUZFU1QuTUbzTczLTEstLtENSy0qzszPs1Iw1DPg5XIuSk0sSU3Rdaq0UkgsLk4t0S1KzUms5OUKLshMSS3SdUvMyUlKTM62UigpKk3l5eLlAgBQSwECFAMUAAAACAAAACFYWzbMS0sAAABJAAAAFAAAAAAAAAAAAAAAgAEAAAAATUVUQS1JTkYvTUFOSUZFU1QuTUZQSwUGAAAAAAEAAQBCAAAAfQAAAAAA";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the spider provider
#[derive(Debug, Clone)]
pub struct SpiderConfig {
    /// Mirrors in priority order
    pub candidates: Vec<String>,
    /// How long a result (real or fallback) is kept
    pub ttl: Duration,
    /// HEAD probe deadline
    pub probe_timeout: Duration,
    /// Full GET deadline
    pub fetch_timeout: Duration,
    /// Minimum plausible artifact size
    pub min_bytes: usize,
    pub user_agent: String,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            ttl: Duration::from_secs(6 * 60 * 60),
            probe_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
            min_bytes: DEFAULT_MIN_ARTIFACT_BYTES,
            user_agent: "okhttp/3.15".to_string(),
        }
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

/// The single cached artifact
#[derive(Debug, Clone, Serialize)]
pub struct SpiderEntry {
    #[serde(skip)]
    pub bytes: Bytes,
    /// SHA-256 of `bytes` (hex)
    pub hash: String,
    /// Winning candidate URL, or [`FALLBACK_SOURCE`]
    pub source: String,
    /// False only when every candidate failed
    pub success: bool,
    /// Candidates attempted during the refresh that built this entry
    pub tried: usize,
    pub size: usize,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip)]
    pub stored_at: Instant,
}

impl SpiderEntry {
    fn new(bytes: Bytes, source: String, success: bool, tried: usize) -> Self {
        Self {
            hash: hex::encode(Sha256::digest(&bytes)),
            size: bytes.len(),
            bytes,
            source,
            success,
            tried,
            fetched_at: Utc::now(),
            stored_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// Artifact handed to the HTTP layer
#[derive(Debug, Clone)]
pub struct SpiderArtifact {
    pub entry: Arc<SpiderEntry>,
    /// Served from the cache rather than a refresh made for this call
    pub cached: bool,
}

/// Provider state for `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct SpiderStatus {
    pub candidates: usize,
    pub refreshes: u64,
    pub served: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<SpiderEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
}

// ============================================================================
// Provider
// ============================================================================

/// Ordered-candidate provider with a guaranteed fallback
pub struct SpiderProvider {
    config: SpiderConfig,
    fetcher: Arc<OriginFetcher>,
    fallback: Bytes,
    entry: RwLock<Option<Arc<SpiderEntry>>>,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
    served: AtomicU64,
}

impl SpiderProvider {
    /// Create a new provider
    pub fn new(config: SpiderConfig, fetcher: Arc<OriginFetcher>) -> Result<Self> {
        let fallback = embedded_fallback()?;

        if config.candidates.is_empty() {
            warn!("No spider candidates configured, the fallback artifact will always be served");
        }
        info!(
            candidates = config.candidates.len(),
            ttl_secs = config.ttl.as_secs(),
            fallback_size = fallback.len(),
            "SpiderProvider initialized"
        );

        Ok(Self {
            config,
            fetcher,
            fallback,
            entry: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
            served: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    /// Get the artifact, refreshing when absent, expired or forced.
    ///
    /// Never fails: total origin failure yields the embedded artifact.
    pub async fn get(&self, force_refresh: bool) -> SpiderArtifact {
        self.served.fetch_add(1, Ordering::Relaxed);

        if !force_refresh {
            if let Some(entry) = self.fresh_entry().await {
                debug!(source = %entry.source, "Spider cache hit");
                return SpiderArtifact { entry, cached: true };
            }
        }

        let requested_at = Instant::now();
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(entry) = self.fresh_entry().await {
            if !force_refresh || entry.stored_at >= requested_at {
                return SpiderArtifact { entry, cached: true };
            }
        }

        let entry = Arc::new(self.refresh().await);
        *self.entry.write().await = Some(Arc::clone(&entry));

        SpiderArtifact {
            entry,
            cached: false,
        }
    }

    /// Provider state snapshot
    pub async fn status(&self) -> SpiderStatus {
        let current = self.entry.read().await.clone();
        SpiderStatus {
            candidates: self.config.candidates.len(),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            served: self.served.load(Ordering::Relaxed),
            age_secs: current.as_ref().map(|e| e.stored_at.elapsed().as_secs()),
            current: current.map(|e| (*e).clone()),
        }
    }

    async fn fresh_entry(&self) -> Option<Arc<SpiderEntry>> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|e| e.is_fresh(self.config.ttl))
            .cloned()
    }

    /// Walk the candidates in order; fall back when all fail
    async fn refresh(&self) -> SpiderEntry {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        let mut tried = 0usize;

        for url in &self.config.candidates {
            tried += 1;

            match self.try_candidate(url).await {
                Ok(bytes) => {
                    let entry = SpiderEntry::new(bytes, url.clone(), true, tried);
                    info!(
                        source = %url,
                        size = entry.size,
                        hash = %entry.hash,
                        tried = tried,
                        "Spider artifact refreshed"
                    );
                    return entry;
                }
                Err(e) => {
                    warn!(candidate = %url, error = %e, "Spider candidate failed");
                }
            }
        }

        warn!(
            tried = tried,
            "All spider candidates failed, serving embedded fallback"
        );
        SpiderEntry::new(self.fallback.clone(), FALLBACK_SOURCE.to_string(), false, tried)
    }

    async fn try_candidate(&self, url: &str) -> Result<Bytes> {
        self.fetcher
            .probe(url, &self.config.user_agent, self.config.probe_timeout)
            .await?;

        let request = FetchRequest {
            url,
            user_agent: &self.config.user_agent,
            etag: None,
            timeout: self.config.fetch_timeout,
            max_bytes: None,
        };

        match self.fetcher.fetch(&request).await? {
            FetchOutcome::Fetched(fetched) if fetched.body.len() >= self.config.min_bytes => {
                Ok(fetched.body)
            }
            FetchOutcome::Fetched(fetched) => Err(RelayError::ValidationFailed(format!(
                "artifact of {} bytes is below the {} byte minimum",
                fetched.body.len(),
                self.config.min_bytes
            ))),
            FetchOutcome::NotModified => Err(RelayError::Internal(
                "unexpected 304 for unconditional request".to_string(),
            )),
        }
    }
}

/// Decode the embedded fallback artifact
pub fn embedded_fallback() -> Result<Bytes> {
    base64::engine::general_purpose::STANDARD
        .decode(FALLBACK_JAR_B64)
        .map(Bytes::from)
        .map_err(|e| RelayError::Internal(format!("Embedded fallback artifact is corrupt: {e}")))
}
