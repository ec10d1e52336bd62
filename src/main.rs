//! NFT Collection Engine
//!
//! Serves one collection analytics session over HTTP.
//!
//! # Architecture
//!
//! - **Fetcher**: Alchemy NFT API pages behind the `CollectionFetcher` trait
//! - **Loader**: retrying, de-duplicating, stale-safe pagination state machine
//! - **Rarity + Filters**: scored collection and the filter/sort pipeline
//! - **API Server**: REST endpoints for frontend consumption
//!
//! # Graceful Shutdown
//!
//! SIGTERM and SIGINT stop accepting connections and let in-flight requests
//! complete.

use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use collection_engine::api::{self, AppState, SharedFetcher};
use collection_engine::collection::{CollectionLoader, RetryPolicy};
use collection_engine::config::Config;
use collection_engine::fetch::AlchemyFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 NFT Collection Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Config::from_env()?;
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "prometheus")]
    install_metrics_exporter(config.api.metrics_port)?;

    let fetcher: SharedFetcher = Arc::new(AlchemyFetcher::new(&config.indexer)?);

    let loader = CollectionLoader::new(fetcher, RetryPolicy::from(config.loader.clone()));
    info!("✅ Collection session {} ready", loader.session_id());

    let state = Arc::new(AppState::new(loader, Some(config.favorites.path.clone())));
    info!(
        "✅ {} favorites loaded from {}",
        state.favorites.read().await.len(),
        config.favorites.path.display()
    );

    info!("═══════════════════════════════════════════════════════════════");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    api::start_server(state, &config.api, shutdown_signal()).await?;

    info!("👋 NFT Collection Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("collection_engine=debug,nft_collection_engine=debug,tower_http=debug,info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .init();
}

#[cfg(feature = "prometheus")]
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;
    info!("📊 Prometheus metrics on port {}", port);
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("📴 Shutdown signal received");
}
