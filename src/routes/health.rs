//! Operational endpoints
//!
//! - /health, /healthz - liveness with per-class entry counts
//! - /version - build information
//! - /stats - request stats for both proxies plus spider provider state
//!
//! The relay has no hard dependencies, so liveness is always 200 while the
//! process is serving.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::proxy::ProxySnapshot;
use crate::routes::json_response;
use crate::server::AppState;
use crate::spider::SpiderStatus;

/// Liveness response
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the relay started
    pub uptime: u64,
    pub timestamp: String,
    pub node_id: String,
    pub caches: CacheEntries,
}

/// Entry counts per asset class
#[derive(Serialize)]
pub struct CacheEntries {
    pub key: usize,
    pub logo: usize,
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        node_id: state.args.node_id.to_string(),
        caches: CacheEntries {
            key: state.key_proxy.store().len(),
            logo: state.logo_proxy.store().len(),
        },
    };

    json_response(StatusCode::OK, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "asset-relay",
    };

    json_response(StatusCode::OK, &response)
}

/// Origin connection bounds currently free
#[derive(Serialize)]
pub struct ConnectionStats {
    pub http_available: usize,
    pub https_available: usize,
    pub max_per_scheme: usize,
}

/// Runtime stats snapshot
#[derive(Serialize)]
pub struct StatsResponse {
    pub node_id: String,
    pub uptime: u64,
    pub key: ProxySnapshot,
    pub logo: ProxySnapshot,
    pub spider: SpiderStatus,
    pub connections: ConnectionStats,
}

/// Handle stats endpoint (/stats)
pub async fn stats_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = StatsResponse {
        node_id: state.args.node_id.to_string(),
        uptime: state.started_at.elapsed().as_secs(),
        key: state.key_proxy.snapshot(),
        logo: state.logo_proxy.snapshot(),
        spider: state.spider.status().await,
        connections: ConnectionStats {
            http_available: state.fetcher.available_permits("http"),
            https_available: state.fetcher.available_permits("https"),
            max_per_scheme: state.fetcher.config().max_connections_per_scheme,
        },
    };

    json_response(StatusCode::OK, &response)
}
