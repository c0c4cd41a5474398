//! Key and logo proxy endpoints
//!
//! - GET /proxy/key?url=<encoded>&source=<key>
//! - GET /proxy/logo?url=<encoded>&source=<key>
//!
//! Successful responses carry the raw origin bytes with `X-Cache`, `ETag` and
//! the class `Cache-Control`. Failures are JSON `{ "error", "details" }`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::proxy::{ProxyResponse, ResourceProxy};
use crate::routes::{finish, json_response};
use crate::server::AppState;
use crate::types::RelayError;

/// Query parameters shared by both proxy endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
    pub source: Option<String>,
}

impl ProxyQuery {
    /// Decode a raw query string (percent-decoding happens exactly once here)
    pub fn parse(query: Option<&str>) -> Result<Self, RelayError> {
        serde_urlencoded::from_str(query.unwrap_or("")).map_err(|e| RelayError::InvalidParameter {
            name: "query",
            reason: e.to_string(),
        })
    }
}

/// Handle GET /proxy/key
pub async fn handle_key_proxy(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    serve(&state.key_proxy, query).await
}

/// Handle GET /proxy/logo
pub async fn handle_logo_proxy(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    serve(&state.logo_proxy, query).await
}

async fn serve(proxy: &ResourceProxy, query: Option<&str>) -> Response<Full<Bytes>> {
    let query = match ProxyQuery::parse(query) {
        Ok(q) => q,
        Err(e) => return error_response(&e),
    };

    match proxy
        .handle(query.url.as_deref(), query.source.as_deref())
        .await
    {
        Ok(response) => {
            debug!(
                class = proxy.name(),
                cache = response.cache_status.header_value(),
                size = response.bytes.len(),
                "Proxy response"
            );
            success_response(response)
        }
        Err(e) => error_response(&e),
    }
}

fn success_response(response: ProxyResponse) -> Response<Full<Bytes>> {
    finish(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, response.content_type)
            .header(header::CONTENT_LENGTH, response.bytes.len())
            .header(header::ETAG, response.etag)
            .header(header::CACHE_CONTROL, response.cache_control)
            .header("X-Cache", response.cache_status.header_value())
            .header("Access-Control-Allow-Origin", "*"),
        response.bytes,
    )
}

/// Seconds a client should wait before retrying a transient origin failure
pub const RETRY_AFTER_SECS: u64 = 5;

/// JSON error response for a relay error
pub fn error_response(err: &RelayError) -> Response<Full<Bytes>> {
    let mut response = json_response(err.status_code(), &err.to_body());
    if err.is_retryable() {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
    }
    response
}
