//! Conditional Origin Fetcher
//!
//! Single outbound HTTP path for every asset class. One `reqwest::Client` is
//! shared process-wide so keep-alive connections are reused across classes.
//! On top of the client's idle pool, a semaphore per scheme caps the number
//! of requests in flight (and therefore open sockets) per scheme.
//!
//! Outcomes are three-way:
//!
//! - `FetchOutcome::Fetched`: 2xx with a body
//! - `FetchOutcome::NotModified`: 304 in answer to `If-None-Match`
//! - `FetchError`: anything else (timeout, transport, non-2xx, oversize)
//!
//! Every call carries a hard deadline covering connection wait, headers and
//! body. When it fires the request future is dropped, which releases the
//! permit and closes the connection; no partial body is ever returned.

use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH, USER_AGENT};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info};

// ============================================================================
// Errors
// ============================================================================

/// Error types for origin fetches
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL cannot be parsed or uses a scheme other than http/https
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Deadline exceeded
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// DNS failure or connection refused
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// Origin answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Body exceeds the caller's size limit
    #[error("Body too large: {actual} bytes (limit {limit})")]
    TooLarge { limit: usize, actual: usize },

    /// Any other transport failure (reset, protocol error, body read)
    #[error("Transport error: {0}")]
    Transport(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Maximum concurrent origin requests per scheme
    pub max_connections_per_scheme: usize,
    /// Maximum idle keep-alive connections per host
    pub max_idle_per_host: usize,
    /// How long an idle connection is kept
    pub idle_timeout: Duration,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_connections_per_scheme: 30,
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// Parameters for one origin GET
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub user_agent: &'a str,
    /// Validator from a previously cached copy; sent as `If-None-Match`
    pub etag: Option<&'a str>,
    pub timeout: Duration,
    /// Abort once the body grows past this many bytes
    pub max_bytes: Option<usize>,
}

/// Successful 2xx response
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Result of a (possibly conditional) fetch
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(FetchedResource),
    /// 304: the cached copy is still valid
    NotModified,
}

// ============================================================================
// Origin Fetcher
// ============================================================================

/// Shared origin client with per-scheme connection bounds
pub struct OriginFetcher {
    client: reqwest::Client,
    http_permits: Arc<Semaphore>,
    https_permits: Arc<Semaphore>,
    config: FetcherConfig,
}

impl OriginFetcher {
    /// Create a new fetcher
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {e}")))?;

        info!(
            max_per_scheme = config.max_connections_per_scheme,
            max_idle_per_host = config.max_idle_per_host,
            "OriginFetcher initialized"
        );

        Ok(Self {
            client,
            http_permits: Arc::new(Semaphore::new(config.max_connections_per_scheme)),
            https_permits: Arc::new(Semaphore::new(config.max_connections_per_scheme)),
            config,
        })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(FetcherConfig::default())
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Requests currently allowed to start for a scheme
    pub fn available_permits(&self, scheme: &str) -> usize {
        match scheme {
            "http" => self.http_permits.available_permits(),
            _ => self.https_permits.available_permits(),
        }
    }

    /// Parse and check an origin URL (http/https only)
    pub fn parse_url(raw: &str) -> Result<Url, FetchError> {
        let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(FetchError::InvalidUrl(format!("unsupported scheme '{other}'")));
            }
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(FetchError::InvalidUrl("missing host".to_string()));
        }
        Ok(url)
    }

    fn permits_for(&self, url: &Url) -> &Arc<Semaphore> {
        match url.scheme() {
            "http" => &self.http_permits,
            _ => &self.https_permits,
        }
    }

    /// GET a resource, conditionally when `etag` is set
    pub async fn fetch(&self, req: &FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
        let url = Self::parse_url(req.url)?;
        let timeout_ms = req.timeout.as_millis() as u64;

        match tokio::time::timeout(req.timeout, self.fetch_inner(url, req, timeout_ms)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(url = req.url, timeout_ms = timeout_ms, "Origin fetch timed out");
                Err(FetchError::Timeout(timeout_ms))
            }
        }
    }

    async fn fetch_inner(
        &self,
        url: Url,
        req: &FetchRequest<'_>,
        timeout_ms: u64,
    ) -> Result<FetchOutcome, FetchError> {
        let _permit = self
            .permits_for(&url)
            .acquire()
            .await
            .map_err(|_| FetchError::Transport("connection pool closed".to_string()))?;

        let mut builder = self
            .client
            .get(url)
            .header(USER_AGENT, req.user_agent)
            .timeout(req.timeout);
        if let Some(etag) = req.etag {
            builder = builder.header(IF_NONE_MATCH, etag);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(e, timeout_ms))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(url = req.url, "Origin answered 304");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = header_string(&response, CONTENT_TYPE);
        let etag = header_string(&response, ETAG);

        if let (Some(limit), Some(len)) = (req.max_bytes, response.content_length()) {
            if len as usize > limit {
                return Err(FetchError::TooLarge {
                    limit,
                    actual: len as usize,
                });
            }
        }

        let body = read_body(response, req.max_bytes, timeout_ms).await?;

        Ok(FetchOutcome::Fetched(FetchedResource {
            status: status.as_u16(),
            body,
            content_type,
            etag,
        }))
    }

    /// Lightweight existence check (HEAD). Ok only for a 2xx answer.
    pub async fn probe(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let parsed = Self::parse_url(url)?;
        let timeout_ms = timeout.as_millis() as u64;

        let probe = async {
            let _permit = self
                .permits_for(&parsed)
                .acquire()
                .await
                .map_err(|_| FetchError::Transport("connection pool closed".to_string()))?;

            let response = self
                .client
                .head(parsed.clone())
                .header(USER_AGENT, user_agent)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify_error(e, timeout_ms))?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(FetchError::Status(response.status().as_u16()))
            }
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout_ms)),
        }
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn classify_error(err: reqwest::Error, timeout_ms: u64) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout_ms)
    } else if err.is_connect() {
        FetchError::Unreachable(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Read the body chunk by chunk, aborting past `max_bytes`
async fn read_body(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
    timeout_ms: u64,
) -> Result<Bytes, FetchError> {
    let mut buf = BytesMut::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_error(e, timeout_ms))?
    {
        if let Some(limit) = max_bytes {
            if buf.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge {
                    limit,
                    actual: buf.len() + chunk.len(),
                });
            }
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

// ============================================================================
// Tests
// ============================================================================
