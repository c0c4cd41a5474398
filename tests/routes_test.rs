//! HTTP-level tests: status codes, headers and JSON bodies

use std::sync::Arc;

use asset_relay::server::{dispatch, AppState};
use asset_relay::sources::StaticSourceRegistry;
use asset_relay::Args;
use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Response, StatusCode};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn state(extra: &[&str]) -> AppState {
    let mut argv = vec!["asset-relay"];
    argv.extend_from_slice(extra);
    let args = Args::parse_from(argv);
    let registry = StaticSourceRegistry::empty(args.default_user_agent.clone());
    AppState::new(args, Arc::new(registry)).unwrap()
}

fn encode(url: &str) -> String {
    serde_urlencoded::to_string([("url", url)]).unwrap()
}

fn header<'a>(response: &'a Response<Full<Bytes>>, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

async fn body(response: Response<Full<Bytes>>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

#[tokio::test]
async fn test_key_route_headers() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/k"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![7u8; 16], "binary/octet-stream")
                .insert_header("ETag", "\"abc\""),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let state = state(&[]);
    let query = encode(&format!("{}/k", origin.uri()));

    let miss = dispatch(&state, &Method::GET, "/proxy/key", Some(&query)).await;
    assert_eq!(miss.status(), StatusCode::OK);
    assert_eq!(header(&miss, "x-cache"), "MISS");
    assert_eq!(header(&miss, "content-type"), "application/octet-stream");
    assert_eq!(header(&miss, "content-length"), "16");
    assert_eq!(header(&miss, "etag"), "\"abc\"");
    assert_eq!(header(&miss, "cache-control"), "public, max-age=300");
    assert_eq!(header(&miss, "access-control-allow-origin"), "*");
    assert_eq!(body(miss).await.len(), 16);

    let hit = dispatch(&state, &Method::GET, "/api/proxy/key", Some(&query)).await;
    assert_eq!(header(&hit, "x-cache"), "HIT");
}

#[tokio::test]
async fn test_unknown_source_is_404_json() {
    let state = state(&[]);
    let query = format!("{}&source=ghost", encode("https://origin.test/k"));

    let response = dispatch(&state, &Method::GET, "/proxy/key", Some(&query)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&response, "content-type"), "application/json");

    let json: serde_json::Value = serde_json::from_slice(&body(response).await).unwrap();
    assert_eq!(json["error"], "Source not found");
    assert!(json["details"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_logo_unknown_source_is_served() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"\x89PNG\r\n\x1a\n0000".to_vec(), "image/png"),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let state = state(&[]);
    let query = format!("{}&source=ghost", encode(&format!("{}/logo.png", origin.uri())));

    let response = dispatch(&state, &Method::GET, "/proxy/logo", Some(&query)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(header(&response, "x-cache"), "MISS");
}

#[tokio::test]
async fn test_invalid_url_is_400() {
    let state = state(&[]);
    let query = encode("javascript:alert(1)");

    let response = dispatch(&state, &Method::GET, "/proxy/logo", Some(&query)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logo_route_rejects_non_image() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"{}".to_vec(), "application/json"))
        .mount(&origin)
        .await;

    let state = state(&[]);
    let query = encode(&format!("{}/logo", origin.uri()));

    let response = dispatch(&state, &Method::GET, "/proxy/logo", Some(&query)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body(response).await).unwrap();
    assert_eq!(json["error"], "Validation failed");
}

#[tokio::test]
async fn test_spider_route_success_headers() {
    let origin = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/spider.jar"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/spider.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8; 1500], "application/octet-stream"))
        .mount(&origin)
        .await;

    let candidate = format!("{}/spider.jar", origin.uri());
    let state = state(&["--spider-candidates", &candidate]);

    let first = dispatch(&state, &Method::GET, "/proxy/spider", None).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "content-type"), "application/java-archive");
    assert_eq!(header(&first, "x-source"), candidate);
    assert_eq!(header(&first, "x-success"), "true");
    assert_eq!(header(&first, "x-cached"), "false");
    assert_eq!(body(first).await.len(), 1500);

    let second = dispatch(&state, &Method::GET, "/api/proxy/spider", None).await;
    assert_eq!(header(&second, "x-cached"), "true");

    let forced = dispatch(&state, &Method::GET, "/proxy/spider", Some("refresh=true")).await;
    assert_eq!(header(&forced, "x-cached"), "false");
}

#[tokio::test]
async fn test_spider_route_fallback_is_still_200() {
    let state = state(&[]);

    let response = dispatch(&state, &Method::GET, "/proxy/spider", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-source"), "fallback");
    assert_eq!(header(&response, "x-success"), "false");
    assert_eq!(header(&response, "cache-control"), "no-cache");
    assert!(body(response).await.starts_with(b"PK"));
}

#[tokio::test]
async fn test_version_route() {
    let state = state(&[]);
    let response = dispatch(&state, &Method::GET, "/version", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body(response).await).unwrap();
    assert_eq!(json["service"], "asset-relay");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
