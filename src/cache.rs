use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::search::SearchPage;

/// What mutating code depends on. Today every write clears everything; a
/// keyed strategy can replace this without touching callers.
pub trait Invalidator: Send + Sync {
    fn invalidate_all(&self);
}

struct CacheEntry {
    page: Arc<SearchPage>,
    expires_at: Instant,
}

/// Short-lived memo of search pages keyed by canonical filter.
///
/// Holds no authoritative data. A generation counter guards against storing
/// a page that was computed while a mutation invalidated the cache.
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    generation: AtomicU64,
    default_ttl: Duration,
}

impl ResultCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entry or `None`. Expired entries read as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<SearchPage>> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.page.clone())
    }

    pub fn set(&self, key: String, page: Arc<SearchPage>, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                page,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Store only if no invalidation happened since `seen_generation` was read.
    /// Returns whether the page was stored.
    pub fn set_if_current(
        &self,
        key: String,
        page: Arc<SearchPage>,
        ttl: Duration,
        seen_generation: u64,
    ) -> bool {
        if self.generation() != seen_generation {
            return false;
        }
        self.set(key, page, ttl);
        // An invalidation may have slipped in between the check and the insert.
        if self.generation() != seen_generation {
            self.entries.clear();
            return false;
        }
        true
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        metrics::gauge!(crate::observability::CACHE_ENTRIES).set(self.entries.len() as f64);
        removed
    }
}

impl Invalidator for ResultCache {
    fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
        metrics::counter!(crate::observability::CACHE_INVALIDATIONS_TOTAL).increment(1);
    }
}
