//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per connection.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::cache::spawn_cleanup_task;
use crate::config::Args;
use crate::origin::OriginFetcher;
use crate::proxy::{KeyPolicy, LogoPolicy, ResourceProxy};
use crate::routes::{self, finish, json_response};
use crate::sources::{SourceRegistry, StaticSourceRegistry};
use crate::spider::SpiderProvider;
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Origin client shared by every asset class
    pub fetcher: Arc<OriginFetcher>,
    /// Decryption key proxy
    pub key_proxy: Arc<ResourceProxy>,
    /// Channel logo proxy
    pub logo_proxy: Arc<ResourceProxy>,
    /// Spider artifact provider
    pub spider: Arc<SpiderProvider>,
    pub started_at: Instant,
}

impl AppState {
    /// Build state with an explicit source registry
    pub fn new(args: Args, sources: Arc<dyn SourceRegistry>) -> Result<Self> {
        let fetcher = Arc::new(OriginFetcher::new(args.fetcher_config())?);

        let key_proxy = Arc::new(ResourceProxy::new(
            KeyPolicy,
            args.key_proxy_config(),
            Arc::clone(&fetcher),
            Arc::clone(&sources),
        ));
        let logo_proxy = Arc::new(ResourceProxy::new(
            LogoPolicy::new(args.logo_max_bytes),
            args.logo_proxy_config(),
            Arc::clone(&fetcher),
            sources,
        ));
        let spider = Arc::new(SpiderProvider::new(
            args.spider_config(),
            Arc::clone(&fetcher),
        )?);

        Ok(Self {
            args,
            fetcher,
            key_proxy,
            logo_proxy,
            spider,
            started_at: Instant::now(),
        })
    }

    /// Build state, loading the source registry named by `SOURCES_FILE`
    pub fn from_args(args: Args) -> Result<Self> {
        let sources: Arc<dyn SourceRegistry> = match &args.sources_file {
            Some(path) => Arc::new(StaticSourceRegistry::load(
                path,
                args.default_user_agent.clone(),
            )?),
            None => {
                warn!("No SOURCES_FILE configured, requests naming a source will be rejected");
                Arc::new(StaticSourceRegistry::empty(args.default_user_agent.clone()))
            }
        };

        Self::new(args, sources)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Asset relay listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    let interval = state.args.cleanup_interval();
    spawn_cleanup_task(Arc::clone(state.key_proxy.store()), interval);
    spawn_cleanup_task(Arc::clone(state.logo_proxy.store()), interval);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    debug!("[{}] {} {}", addr, method, path);

    Ok(dispatch(&state, &method, &path, query.as_deref()).await)
}

/// Route a request to its handler
pub async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        // CORS preflight
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/health" | "/healthz") => routes::health_check(state),
        (&Method::GET, "/version") => routes::version_info(),
        (&Method::GET, "/stats") => routes::stats_check(state).await,

        (&Method::GET, "/proxy/key" | "/api/proxy/key") => {
            routes::handle_key_proxy(state, query).await
        }
        (&Method::GET, "/proxy/logo" | "/api/proxy/logo") => {
            routes::handle_logo_proxy(state, query).await
        }
        (&Method::GET, "/proxy/spider" | "/api/proxy/spider") => {
            routes::handle_spider(state, query).await
        }

        (_, p) if is_known_route(p) => method_not_allowed_response(method),
        _ => not_found_response(path),
    }
}

fn is_known_route(path: &str) -> bool {
    matches!(
        path.strip_prefix("/api").unwrap_or(path),
        "/health" | "/healthz" | "/version" | "/stats" | "/proxy/key" | "/proxy/logo" | "/proxy/spider"
    )
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    finish(
        Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Headers", "*")
            .header("Access-Control-Allow-Methods", "GET, OPTIONS"),
        Bytes::new(),
    )
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
        "hint": "Use /proxy/key, /proxy/logo or /proxy/spider"
    });

    json_response(StatusCode::NOT_FOUND, &body)
}

fn method_not_allowed_response(method: &Method) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Method Not Allowed",
        "method": method.as_str(),
    });

    json_response(StatusCode::METHOD_NOT_ALLOWED, &body)
}
