use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::ResultCache;
use crate::engine::Engine;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that periodically drops expired search results.
pub async fn run_cache_sweeper(cache: Arc<ResultCache>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let removed = cache.cleanup();
        if removed > 0 {
            tracing::debug!("cache sweep removed {removed} expired entries");
        }
    }
}

/// Background task that rewrites the ledger once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor step. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.ledger_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_ledger().await {
        Ok(()) => {
            info!("compacted ledger after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("ledger compaction failed: {e}");
            false
        }
    }
}
