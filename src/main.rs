//! Asset Relay - caching delivery layer for keys, logos and the spider artifact

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asset_relay::{config::Args, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("asset_relay={},info", log_level).into());
    if args.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let candidates = args.spider_candidate_list();

    info!("======================================");
    info!("  Asset Relay");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Keys: ttl {}s, max {} entries, timeout {}ms",
        args.key_ttl_secs, args.key_max_entries, args.key_timeout_ms
    );
    info!(
        "Logos: ttl {}s, max {} entries, timeout {}ms, max {} bytes",
        args.logo_ttl_secs, args.logo_max_entries, args.logo_timeout_ms, args.logo_max_bytes
    );
    info!(
        "Origin pool: {} per scheme, {} idle per host",
        args.pool_max_total, args.pool_max_idle
    );
    info!("Spider candidates: {}", candidates.len());
    for (i, url) in candidates.iter().enumerate() {
        info!("  candidate-{}: {}", i, url);
    }
    if let Some(ref path) = args.sources_file {
        info!("Sources file: {}", path.display());
    }
    info!("======================================");

    let state = match server::AppState::from_args(args) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize relay: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
