//! In-memory latency histogram for upstream chain API calls.
//! Every request attempt (success, failure or timeout) is recorded by the clients.

use std::sync::Mutex;
use std::time::Duration;

/// Shared latency stats. Clients record, API reads.
/// Values stored in milliseconds.
pub struct LatencyStats {
    inner: Mutex<Option<hdrhistogram::Histogram<u64>>>,
}

impl LatencyStats {
    /// Tracks 1ms to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000, 3).ok();
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record_ms(&self, ms: u64) {
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(h) = guard.as_mut() {
                let _ = h.record(ms.max(1));
            }
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.record_ms(ms);
    }

    /// Return (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let Ok(guard) = self.inner.lock() else {
            return (None, None, None);
        };
        let Some(h) = guard.as_ref().filter(|h| h.len() > 0) else {
            return (None, None, None);
        };
        (
            Some(h.value_at_quantile(0.5)),
            Some(h.value_at_quantile(0.95)),
            Some(h.value_at_quantile(0.99)),
        )
    }

    pub fn len(&self) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|h| h.len()))
            .unwrap_or(0)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}
