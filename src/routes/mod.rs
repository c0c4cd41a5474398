//! HTTP routes for the asset relay

pub mod health;
pub mod proxy;
pub mod spider;

pub use health::{health_check, stats_check, version_info};
pub use proxy::{error_response, handle_key_proxy, handle_logo_proxy};
pub use spider::handle_spider;

use bytes::Bytes;
use http_body_util::Full;
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

/// Finish a response builder, degrading to a bare 500 if a header was invalid
pub(crate) fn finish(builder: Builder, body: Bytes) -> Response<Full<Bytes>> {
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build response");
        let mut response = Response::new(Full::new(Bytes::from_static(
            br#"{"error":"Internal server error"}"#,
        )));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// JSON response with CORS open to any origin
pub(crate) fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value)
        .unwrap_or_else(|_| br#"{"error":"Serialization failed"}"#.to_vec());

    finish(
        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*"),
        Bytes::from(body),
    )
}
