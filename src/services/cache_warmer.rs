use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{info, warn};

use crate::services::AggregationService;
use crate::types::{AllData, DataStatus, Period};

/// Periodically force-refreshes every dataset so requests hit a warm cache.
pub struct CacheWarmer {
    service: Arc<AggregationService>,
    every: Duration,
    running: AtomicBool,
}

impl CacheWarmer {
    pub fn new(service: Arc<AggregationService>, every: Duration) -> Self {
        Self {
            service,
            every,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // skip immediate first tick, requests fetch on demand until then

        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }

    /// One warm pass. Returns `None` when a previous pass is still running.
    pub async fn refresh(&self) -> Option<AllData> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Cache refresh still running, skipping tick");
            return None;
        }

        let health = self.service.health();
        health.set_warming(true);
        let started = Instant::now();
        let all = self.service.get_all_data(Period::All, true).await;
        health.set_warming(false);
        self.running.store(false, Ordering::Release);

        let statuses = [
            ("trades", all.trades.count, all.trades.status),
            ("burns", all.burns.count, all.burns.status),
            ("crafts", all.crafts.count, all.crafts.status),
            ("morphs", all.morphs.count, all.morphs.status),
            ("giftz_sales", all.giftz_sales.count, all.giftz_sales.status),
            ("users", all.users.count, all.users.status),
        ];
        let failed = statuses
            .iter()
            .filter(|(_, _, s)| matches!(s, DataStatus::Stale | DataStatus::Error))
            .count();
        for (dataset, count, status) in statuses {
            info!(dataset, count, status = %status, "[WARM] {dataset}: {count} records ({status})");
        }
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            failed,
            "Cache refresh complete: {} ok, {failed} failed",
            statuses.len() - failed,
        );

        Some(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::health::HealthState;
    use crate::api::latency::LatencyStats;
    use crate::config::Config;
    use crate::test_support::{FakeResponse, FakeUpstream};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn overlapping_refresh_is_skipped() {
        let upstream = FakeUpstream::start(|_| {
            FakeResponse::status(503, json!({})).delayed(Duration::from_millis(50))
        })
        .await;
        let dir = TempDir::new().unwrap();
        let cfg = Config::for_tests(&upstream.base_url, dir.path().to_str().unwrap());
        let health = Arc::new(HealthState::new());
        let svc = Arc::new(
            AggregationService::new(cfg, Arc::clone(&health), Arc::new(LatencyStats::new())).unwrap(),
        );
        let warmer = CacheWarmer::new(svc, Duration::from_secs(3600));

        let (first, second) = tokio::join!(warmer.refresh(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            warmer.refresh().await
        });

        let first = first.expect("first pass runs");
        assert_eq!(first.burns.status, DataStatus::Error);
        assert!(second.is_none());
        assert!(!health.warming());
    }
}
