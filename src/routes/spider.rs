//! Spider artifact endpoint
//!
//! GET /proxy/spider[?refresh=true]
//!
//! Always answers 200 with a jar. `X-Success: false` and
//! `X-Source: fallback` mark the embedded stand-in.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::routes::finish;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
struct SpiderQuery {
    refresh: Option<String>,
}

/// Whether the query asks for a forced refresh (`refresh=true` or `refresh=1`)
pub fn wants_refresh(query: Option<&str>) -> bool {
    serde_urlencoded::from_str::<SpiderQuery>(query.unwrap_or(""))
        .ok()
        .and_then(|q| q.refresh)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Handle GET /proxy/spider
pub async fn handle_spider(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    let artifact = state.spider.get(wants_refresh(query)).await;
    let entry = &artifact.entry;

    debug!(
        source = %entry.source,
        success = entry.success,
        cached = artifact.cached,
        "Spider response"
    );

    // Fallback answers must not be pinned by intermediaries
    let cache_control = if entry.success {
        "public, max-age=3600"
    } else {
        "no-cache"
    };

    finish(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/java-archive")
            .header(header::CONTENT_LENGTH, entry.bytes.len())
            .header(header::ETAG, format!("\"{}\"", &entry.hash[..16]))
            .header(header::CACHE_CONTROL, cache_control)
            .header("X-Source", entry.source.as_str())
            .header("X-Success", if entry.success { "true" } else { "false" })
            .header("X-Cached", if artifact.cached { "true" } else { "false" })
            .header("X-Tried", entry.tried)
            .header("Access-Control-Allow-Origin", "*"),
        entry.bytes.clone(),
    )
}
