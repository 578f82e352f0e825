use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::net::TcpListener;
use tracing::info;

use fleetbook::api::{self, AppState};
use fleetbook::cache::ResultCache;
use fleetbook::config::{Config, StorageKind};
use fleetbook::engine::Engine;
use fleetbook::notify::{self, NotifyHub};
use fleetbook::storage::{MemoryStorage, Storage, WalStorage};
use fleetbook::sweeper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_filter.clone());
    fleetbook::observability::init_tracing(&log_filter);
    fleetbook::observability::init(config.metrics_port);

    let storage: Arc<dyn Storage> = match config.storage {
        StorageKind::Wal => {
            std::fs::create_dir_all(&config.data_dir)?;
            Arc::new(WalStorage::open(&config.wal_path())?)
        }
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
    };

    let cache = Arc::new(ResultCache::new(config.cache_ttl));
    let notify_hub = Arc::new(NotifyHub::new());

    // Nothing is served until the ledger is fully replayed.
    let engine = Arc::new(Engine::open(storage, cache.clone(), notify_hub.clone()).await?);

    tokio::spawn(sweeper::run_cache_sweeper(cache, config.cache_sweep_interval));
    if config.storage == StorageKind::Wal {
        tokio::spawn(sweeper::run_compactor(engine.clone(), config.compact_threshold));
    }
    tokio::spawn(notify::run_event_logger(notify_hub.subscribe_all()));

    let state = AppState::new(engine.clone());
    let readiness = state.readiness.clone();
    let app = api::router(state);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    readiness.store(true, Ordering::Release);
    info!("fleetbook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  storage: {:?}", config.storage);
    info!("  cache_ttl: {}s", config.cache_ttl.as_secs());
    info!("  vehicles: {}", engine.vehicle_count());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness.store(false, Ordering::Release);
    info!("fleetbook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. In-flight requests finish; new ones are refused.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining requests");
}
