//! Resource proxy integration tests against a mock origin

use std::sync::Arc;
use std::time::Duration;

use asset_relay::origin::OriginFetcher;
use asset_relay::proxy::{CacheStatus, KeyPolicy, LogoPolicy, ProxyConfig, ResourceProxy};
use asset_relay::sources::{SourceEntry, StaticSourceRegistry};
use asset_relay::RelayError;
use hyper::StatusCode;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEFAULT_UA: &str = "relay-test-default";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01";

fn registry() -> Arc<StaticSourceRegistry> {
    Arc::new(StaticSourceRegistry::new(
        vec![SourceEntry {
            key: "live-a".to_string(),
            name: Some("Live A".to_string()),
            user_agent: Some("okhttp/3.15".to_string()),
        }],
        DEFAULT_UA,
    ))
}

fn short_ttl(ttl: Duration, timeout: Duration) -> ProxyConfig {
    ProxyConfig {
        ttl,
        max_entries: 16,
        timeout,
        sweep_every: 0,
        stats_log_every: 0,
    }
}

fn key_proxy(config: ProxyConfig) -> ResourceProxy {
    ResourceProxy::new(
        KeyPolicy,
        config,
        Arc::new(OriginFetcher::with_defaults().unwrap()),
        registry(),
    )
}

fn logo_proxy(config: ProxyConfig) -> ResourceProxy {
    ResourceProxy::new(
        LogoPolicy::default(),
        config,
        Arc::new(OriginFetcher::with_defaults().unwrap()),
        registry(),
    )
}

#[tokio::test]
async fn test_key_miss_hit_then_revalidated_hit() {
    let origin = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/keys/1"))
        .and(header("if-none-match", "\"k1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"KEYDATA".to_vec(), "text/plain")
                .insert_header("ETag", "\"k1\""),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = key_proxy(short_ttl(Duration::from_millis(300), Duration::from_secs(5)));
    let url = format!("{}/keys/1", origin.uri());

    let first = proxy.handle(Some(&url), None).await.unwrap();
    assert_eq!(first.cache_status, CacheStatus::Miss);
    assert_eq!(&first.bytes[..], b"KEYDATA");
    assert_eq!(first.content_type, "application/octet-stream");
    assert_eq!(first.etag, "\"k1\"");

    let second = proxy.handle(Some(&url), None).await.unwrap();
    assert_eq!(second.cache_status, CacheStatus::Hit);

    tokio::time::sleep(Duration::from_millis(400)).await;

    let third = proxy.handle(Some(&url), None).await.unwrap();
    assert_eq!(third.cache_status, CacheStatus::RevalidatedHit);
    assert_eq!(&third.bytes[..], b"KEYDATA");

    // Revalidation restarted the freshness window
    let fourth = proxy.handle(Some(&url), None).await.unwrap();
    assert_eq!(fourth.cache_status, CacheStatus::Hit);

    let stats = proxy.stats();
    assert_eq!(stats.requests, 4);
    assert_eq!(stats.cache_hits, 3);
    assert_eq!(stats.revalidated_hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.total_bytes, 4 * 7);
}

#[tokio::test]
async fn test_stale_entry_with_failing_origin_is_an_error() {
    let origin = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/keys/2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"OLD".to_vec(), "text/plain"))
        .up_to_n_times(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&origin)
        .await;

    let proxy = key_proxy(short_ttl(Duration::from_millis(100), Duration::from_secs(5)));
    let url = format!("{}/keys/2", origin.uri());

    proxy.handle(Some(&url), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = proxy.handle(Some(&url), None).await.unwrap_err();
    assert!(matches!(err, RelayError::OriginHttpError { status: 500 }));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(proxy.stats().errors, 1);
}

#[tokio::test]
async fn test_origin_client_error_passes_through() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&origin)
        .await;

    let proxy = key_proxy(ProxyConfig::keys());
    let url = format!("{}/keys/missing", origin.uri());

    let err = proxy.handle(Some(&url), None).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert!(proxy.store().is_empty());
}

#[tokio::test]
async fn test_slow_origin_times_out() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"K".to_vec(), "text/plain")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&origin)
        .await;

    let proxy = key_proxy(short_ttl(Duration::from_secs(60), Duration::from_millis(200)));
    let url = format!("{}/keys/slow", origin.uri());

    let err = proxy.handle(Some(&url), None).await.unwrap_err();
    assert!(matches!(err, RelayError::Timeout(_)));
    assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT);
    assert!(proxy.store().is_empty());
}

#[tokio::test]
async fn test_unreachable_origin() {
    let proxy = key_proxy(ProxyConfig::keys());
    let err = proxy
        .handle(Some("http://127.0.0.1:1/key"), None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_source_user_agent_and_separate_entries() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys/3"))
        .and(header("user-agent", "okhttp/3.15"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"FROM-A".to_vec(), "text/plain"))
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys/3"))
        .and(header("user-agent", DEFAULT_UA))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"DEFAULT".to_vec(), "text/plain"))
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = key_proxy(ProxyConfig::keys());
    let url = format!("{}/keys/3", origin.uri());

    let a = proxy.handle(Some(&url), Some("live-a")).await.unwrap();
    let d = proxy.handle(Some(&url), None).await.unwrap();
    assert_eq!(&a.bytes[..], b"FROM-A");
    assert_eq!(&d.bytes[..], b"DEFAULT");
    assert_eq!(proxy.store().len(), 2);

    // Both are now cached under their own key
    let a = proxy.handle(Some(&url), Some("live-a")).await.unwrap();
    assert_eq!(a.cache_status, CacheStatus::Hit);
    assert_eq!(&a.bytes[..], b"FROM-A");
}

#[tokio::test]
async fn test_logo_unknown_source_uses_default_user_agent() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ch/logo.png"))
        .and(header("user-agent", DEFAULT_UA))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png"))
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = logo_proxy(ProxyConfig::logos());
    let url = format!("{}/ch/logo.png", origin.uri());

    let response = proxy
        .handle(Some(&url), Some("some-live-source"))
        .await
        .unwrap();
    assert_eq!(response.cache_status, CacheStatus::Miss);
    assert_eq!(response.content_type, "image/png");

    let again = proxy
        .handle(Some(&url), Some("some-live-source"))
        .await
        .unwrap();
    assert_eq!(again.cache_status, CacheStatus::Hit);
}

#[tokio::test]
async fn test_key_unknown_source_is_rejected() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"K".to_vec(), "text/plain"))
        .expect(0)
        .mount(&origin)
        .await;

    let proxy = key_proxy(ProxyConfig::keys());
    let url = format!("{}/keys/9", origin.uri());

    let err = proxy
        .handle(Some(&url), Some("some-live-source"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::SourceNotFound(_)));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logo_rejects_html_and_does_not_cache() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"<html>captcha</html>".to_vec(), "text/html"),
        )
        .expect(2)
        .mount(&origin)
        .await;

    let proxy = logo_proxy(ProxyConfig::logos());
    let url = format!("{}/logo.png", origin.uri());

    for _ in 0..2 {
        let err = proxy.handle(Some(&url), None).await.unwrap_err();
        assert!(matches!(err, RelayError::ValidationFailed(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
    assert!(proxy.store().is_empty());
}

#[tokio::test]
async fn test_logo_sniffed_type_and_synthesized_etag() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "application/octet-stream"))
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = logo_proxy(ProxyConfig::logos());
    let url = format!("{}/logo", origin.uri());

    let first = proxy.handle(Some(&url), None).await.unwrap();
    assert_eq!(first.cache_status, CacheStatus::Miss);
    assert_eq!(first.content_type, "image/png");
    assert_eq!(first.cache_control, "public, max-age=604800, immutable");
    assert!(first.etag.starts_with('"'));

    let second = proxy.handle(Some(&url), None).await.unwrap();
    assert_eq!(second.cache_status, CacheStatus::Hit);
    assert_eq!(second.etag, first.etag);
}

#[tokio::test]
async fn test_logo_size_limit() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 4096], "image/png"))
        .mount(&origin)
        .await;

    let proxy = ResourceProxy::new(
        LogoPolicy::new(1024),
        ProxyConfig::logos(),
        Arc::new(OriginFetcher::with_defaults().unwrap()),
        registry(),
    );
    let url = format!("{}/huge.png", origin.uri());

    let err = proxy.handle(Some(&url), None).await.unwrap_err();
    assert!(matches!(err, RelayError::ValidationFailed(_)));
    assert!(proxy.store().is_empty());
}

#[tokio::test]
async fn test_bound_evicts_oldest() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"K".to_vec(), "text/plain"))
        .mount(&origin)
        .await;

    let mut config = ProxyConfig::keys();
    config.max_entries = 3;
    let proxy = key_proxy(config);

    for i in 0..5 {
        let url = format!("{}/keys/{}", origin.uri(), i);
        proxy.handle(Some(&url), None).await.unwrap();
        assert!(proxy.store().len() <= 3);
    }

    // The newest entry survived
    let newest = format!("{}/keys/4", origin.uri());
    let response = proxy.handle(Some(&newest), None).await.unwrap();
    assert_eq!(response.cache_status, CacheStatus::Hit);
}
