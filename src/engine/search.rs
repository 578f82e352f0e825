use std::sync::Arc;
use std::time::Instant;

use crate::search::{SearchFilter, SearchPage, sort_and_paginate};

use super::Engine;

impl Engine {
    /// Filtered, sorted, paginated catalog view.
    ///
    /// Served from the result cache when possible. A hit may be up to one TTL
    /// old; every mutation clears the cache, so it is never older than the
    /// last write seen by this process.
    pub async fn search(&self, filter: &SearchFilter) -> Arc<SearchPage> {
        let started = Instant::now();
        let key = filter.cache_key();

        if let Some(page) = self.cache.get(&key) {
            metrics::counter!(crate::observability::SEARCH_TOTAL, "cache" => "hit").increment(1);
            return page;
        }

        let generation = self.cache.generation();
        let mut matched = Vec::new();
        for (_, handle) in self.vehicle_handles() {
            let guard = handle.read().await;
            if !guard.retired && filter.matches(&guard) {
                matched.push(guard.vehicle.clone());
            }
        }
        let page = Arc::new(sort_and_paginate(matched, filter));

        let ttl = self.cache.default_ttl();
        if !self.cache.set_if_current(key, page.clone(), ttl, generation) {
            tracing::debug!("search result not cached: ledger changed during scan");
        }

        metrics::counter!(crate::observability::SEARCH_TOTAL, "cache" => "miss").increment(1);
        metrics::histogram!(crate::observability::SEARCH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        page
    }
}
