//! Configuration for the asset relay
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::origin::FetcherConfig;
use crate::proxy::ProxyConfig;
use crate::spider::SpiderConfig;

/// Asset Relay - fetch-through cache for keys, logos and the spider artifact
#[derive(Parser, Debug, Clone)]
#[command(name = "asset-relay")]
#[command(about = "Caching relay for decryption keys, channel logos and the spider artifact")]
pub struct Args {
    /// Unique node identifier for this relay instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// User agent sent to origins when the source has none
    #[arg(
        long,
        env = "DEFAULT_USER_AGENT",
        default_value = "Mozilla/5.0 (Linux; Android 10) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36"
    )]
    pub default_user_agent: String,

    /// JSON file listing known sources and their user agents
    /// Without it every named source is rejected as unknown
    #[arg(long, env = "SOURCES_FILE")]
    pub sources_file: Option<PathBuf>,

    /// Key cache TTL in seconds
    #[arg(long, env = "KEY_TTL_SECS", default_value = "300")]
    pub key_ttl_secs: u64,

    /// Maximum cached keys
    #[arg(long, env = "KEY_MAX_ENTRIES", default_value = "1000")]
    pub key_max_entries: usize,

    /// Key origin timeout in milliseconds
    #[arg(long, env = "KEY_TIMEOUT_MS", default_value = "10000")]
    pub key_timeout_ms: u64,

    /// Logo cache TTL in seconds
    #[arg(long, env = "LOGO_TTL_SECS", default_value = "86400")]
    pub logo_ttl_secs: u64,

    /// Maximum cached logos
    #[arg(long, env = "LOGO_MAX_ENTRIES", default_value = "500")]
    pub logo_max_entries: usize,

    /// Logo origin timeout in milliseconds
    #[arg(long, env = "LOGO_TIMEOUT_MS", default_value = "15000")]
    pub logo_timeout_ms: u64,

    /// Largest logo accepted from an origin, in bytes
    #[arg(long, env = "LOGO_MAX_BYTES", default_value = "5242880")]
    pub logo_max_bytes: usize,

    /// Sweep expired entries every N requests per class (0 disables)
    #[arg(long, env = "SWEEP_EVERY", default_value = "100")]
    pub sweep_every: u64,

    /// Log proxy stats every N requests per class (0 disables)
    #[arg(long, env = "STATS_LOG_EVERY", default_value = "100")]
    pub stats_log_every: u64,

    /// Background store cleanup interval in seconds
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value = "60")]
    pub cleanup_interval_secs: u64,

    /// Maximum concurrent origin connections per scheme
    #[arg(long, env = "POOL_MAX_TOTAL", default_value = "30")]
    pub pool_max_total: usize,

    /// Maximum idle connections kept per origin host
    #[arg(long, env = "POOL_MAX_IDLE", default_value = "10")]
    pub pool_max_idle: usize,

    /// Comma-separated spider artifact mirrors, in priority order
    /// e.g. "https://a.example/spider.jar,https://b.example/spider.jar"
    #[arg(long, env = "SPIDER_CANDIDATES", default_value = "")]
    pub spider_candidates: String,

    /// Spider artifact cache TTL in seconds
    #[arg(long, env = "SPIDER_TTL_SECS", default_value = "21600")]
    pub spider_ttl_secs: u64,

    /// HEAD probe timeout per candidate, in milliseconds
    #[arg(long, env = "SPIDER_PROBE_TIMEOUT_MS", default_value = "5000")]
    pub spider_probe_timeout_ms: u64,

    /// Download timeout per candidate, in milliseconds
    #[arg(long, env = "SPIDER_FETCH_TIMEOUT_MS", default_value = "10000")]
    pub spider_fetch_timeout_ms: u64,

    /// Smallest body accepted as a real spider artifact, in bytes
    #[arg(long, env = "SPIDER_MIN_BYTES", default_value = "1000")]
    pub spider_min_bytes: usize,
}

impl Args {
    /// Parsed spider candidate list (blank items dropped)
    pub fn spider_candidate_list(&self) -> Vec<String> {
        self.spider_candidates
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Whether logs should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            max_connections_per_scheme: self.pool_max_total,
            max_idle_per_host: self.pool_max_idle,
            ..FetcherConfig::default()
        }
    }

    pub fn key_proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            ttl: Duration::from_secs(self.key_ttl_secs),
            max_entries: self.key_max_entries,
            timeout: Duration::from_millis(self.key_timeout_ms),
            sweep_every: self.sweep_every,
            stats_log_every: self.stats_log_every,
        }
    }

    pub fn logo_proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            ttl: Duration::from_secs(self.logo_ttl_secs),
            max_entries: self.logo_max_entries,
            timeout: Duration::from_millis(self.logo_timeout_ms),
            sweep_every: self.sweep_every,
            stats_log_every: self.stats_log_every,
        }
    }

    pub fn spider_config(&self) -> SpiderConfig {
        SpiderConfig {
            candidates: self.spider_candidate_list(),
            ttl: Duration::from_secs(self.spider_ttl_secs),
            probe_timeout: Duration::from_millis(self.spider_probe_timeout_ms),
            fetch_timeout: Duration::from_millis(self.spider_fetch_timeout_ms),
            min_bytes: self.spider_min_bytes,
            user_agent: self.default_user_agent.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                self.log_format
            ));
        }

        if self.default_user_agent.trim().is_empty() {
            return Err("DEFAULT_USER_AGENT must not be empty".to_string());
        }

        if self.key_max_entries == 0 || self.logo_max_entries == 0 {
            return Err("KEY_MAX_ENTRIES and LOGO_MAX_ENTRIES must be at least 1".to_string());
        }

        if self.key_timeout_ms == 0 || self.logo_timeout_ms == 0 {
            return Err("KEY_TIMEOUT_MS and LOGO_TIMEOUT_MS must be greater than 0".to_string());
        }

        if self.pool_max_total == 0 {
            return Err("POOL_MAX_TOTAL must be at least 1".to_string());
        }

        if self.pool_max_idle > self.pool_max_total {
            return Err("POOL_MAX_IDLE must be less than or equal to POOL_MAX_TOTAL".to_string());
        }

        if self.cleanup_interval_secs == 0 {
            return Err("CLEANUP_INTERVAL_SECS must be greater than 0".to_string());
        }

        for candidate in self.spider_candidate_list() {
            if !(candidate.starts_with("http://") || candidate.starts_with("https://")) {
                return Err(format!("SPIDER_CANDIDATES entry is not an http(s) URL: {candidate}"));
            }
        }

        Ok(())
    }
}
