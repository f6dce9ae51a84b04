//! Shared health state for the /api/health endpoint.
//! Updated by the aggregation service and the cache warmer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared health metrics. Updated by the service layer, read by API.
#[derive(Default)]
pub struct HealthState {
    /// True while the background warmer is refreshing every dataset.
    pub warming: AtomicBool,
    /// Millisecond timestamp of the last successful upstream fetch (0 = none).
    pub last_fetch_ok_ms: AtomicU64,
    /// Millisecond timestamp of the last failed upstream fetch (0 = none).
    pub last_fetch_err_ms: AtomicU64,
    pub fetches_ok: AtomicU64,
    pub fetches_failed: AtomicU64,
    pub cache_hits: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_warming(&self, v: bool) {
        self.warming.store(v, Ordering::Relaxed);
    }

    pub fn record_fetch_ok(&self) {
        self.fetches_ok.fetch_add(1, Ordering::Relaxed);
        self.last_fetch_ok_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
        self.last_fetch_err_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn warming(&self) -> bool {
        self.warming.load(Ordering::Relaxed)
    }

    pub fn last_fetch_ok_ms(&self) -> u64 {
        self.last_fetch_ok_ms.load(Ordering::Relaxed)
    }

    pub fn last_fetch_err_ms(&self) -> u64 {
        self.last_fetch_err_ms.load(Ordering::Relaxed)
    }

    pub fn fetches_ok(&self) -> u64 {
        self.fetches_ok.load(Ordering::Relaxed)
    }

    pub fn fetches_failed(&self) -> u64 {
        self.fetches_failed.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
