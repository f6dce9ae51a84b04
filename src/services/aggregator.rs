use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::cache::{CacheFileStatus, FileCache};
use crate::clients::{ArdorClient, PolygonClient};
use crate::config::{Config, NULL_EVM_ADDRESS};
use crate::error::Result;
use crate::filter::filter_records;
use crate::normalize::users::UserAccumulator;
use crate::services::ardor::ArdorService;
use crate::services::polygon::PolygonService;
use crate::types::{
    ActiveUser, Aggregated, AllData, Burn, CacheEntry, Craft, DataStatus, Dataset, GiftzSale,
    Morph, Period, Record, Trade,
};

/// Cache-or-fetch front for every dataset.
///
/// Each `get_*` call reads the dataset's cache file unless `force` is set,
/// otherwise fetches, normalizes, rewrites the cache and filters to `period`.
/// Failures never escape: a cached copy is served as `stale`, or an empty
/// result tagged `error`.
pub struct AggregationService {
    ardor: ArdorService,
    polygon: PolygonService,
    cache: FileCache,
    cfg: Config,
    health: Arc<HealthState>,
    /// One refresh at a time per dataset.
    locks: DashMap<Dataset, Arc<Mutex<()>>>,
}

impl AggregationService {
    pub fn new(cfg: Config, health: Arc<HealthState>, latency: Arc<LatencyStats>) -> Result<Self> {
        let ardor = ArdorService::new(ArdorClient::new(&cfg, Arc::clone(&latency))?, cfg.clone());
        let polygon = PolygonService::new(PolygonClient::new(&cfg, latency)?, &cfg);
        Ok(Self {
            ardor,
            polygon,
            cache: FileCache::new(&cfg.storage_dir),
            cfg,
            health,
            locks: DashMap::new(),
        })
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Card trades on both chains, newest first.
    pub async fn get_trades(&self, period: Period, force: bool) -> Aggregated<Trade> {
        self.aggregate(period, force, || async {
            let (mut ardor, polygon) =
                tokio::try_join!(self.ardor.fetch_trades(), self.polygon.fetch_trades())?;
            ardor.extend(polygon);
            ardor.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(ardor)
        })
        .await
    }

    pub async fn get_burns(&self, period: Period, force: bool) -> Aggregated<Burn> {
        self.aggregate(period, force, || self.ardor.fetch_burns()).await
    }

    pub async fn get_crafts(&self, period: Period, force: bool) -> Aggregated<Craft> {
        self.aggregate(period, force, || self.ardor.fetch_crafts()).await
    }

    pub async fn get_morphs(&self, period: Period, force: bool) -> Aggregated<Morph> {
        self.aggregate(period, force, || self.ardor.fetch_morphs()).await
    }

    pub async fn get_giftz_sales(&self, period: Period, force: bool) -> Aggregated<GiftzSale> {
        self.aggregate(period, force, || self.ardor.fetch_giftz_sales()).await
    }

    /// Users of both chains in one list; a user is in `period` when their last activity is.
    pub async fn get_users(&self, period: Period, force: bool) -> Aggregated<ActiveUser> {
        self.aggregate(period, force, || async {
            let mut acc = UserAccumulator::new([
                self.cfg.burn_account.as_str(),
                self.cfg.craft_account.as_str(),
                self.cfg.morph_account.as_str(),
                NULL_EVM_ADDRESS,
            ]);
            self.ardor.collect_users(&mut acc).await?;
            self.polygon.collect_users(&mut acc).await?;
            Ok(acc.finish())
        })
        .await
    }

    /// All six datasets concurrently. Each branch degrades on its own.
    pub async fn get_all_data(&self, period: Period, force: bool) -> AllData {
        let (trades, burns, crafts, morphs, giftz_sales, users) = tokio::join!(
            self.get_trades(period, force),
            self.get_burns(period, force),
            self.get_crafts(period, force),
            self.get_morphs(period, force),
            self.get_giftz_sales(period, force),
            self.get_users(period, force),
        );
        AllData {
            trades,
            burns,
            crafts,
            morphs,
            giftz_sales,
            users,
            timestamp: Utc::now(),
        }
    }

    pub async fn cache_status(&self) -> Result<Vec<CacheFileStatus>> {
        self.cache.status().await
    }

    pub async fn clear_cache(&self, key: &str) -> Result<bool> {
        let deleted = self.cache.delete(key).await?;
        info!(key, deleted, "Cache entry cleared");
        Ok(deleted)
    }

    pub async fn clear_all(&self) -> Result<usize> {
        let cleared = self.cache.clear().await?;
        info!(cleared, "Cache cleared");
        Ok(cleared)
    }

    fn lock_for(&self, dataset: Dataset) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(dataset).or_default().value())
    }

    async fn cached<T: Record>(&self) -> Option<CacheEntry<T>> {
        let name = T::DATASET.cache_name();
        match self.cache.read_entry::<T>(name).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dataset = name, "Cache read failed: {e}");
                None
            }
        }
    }

    async fn aggregate<T, F, Fut>(&self, period: Period, force: bool, fetch: F) -> Aggregated<T>
    where
        T: Record,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let dataset = T::DATASET;

        if !force {
            if let Some(entry) = self.cached::<T>().await {
                return self.serve_cached(entry, period, DataStatus::Cached);
            }
        }

        let lock = self.lock_for(dataset);
        let _guard = lock.lock().await;

        // Someone else may have filled the cache while this call waited.
        if !force {
            if let Some(entry) = self.cached::<T>().await {
                return self.serve_cached(entry, period, DataStatus::Cached);
            }
        }

        match fetch().await {
            Ok(records) => {
                self.health.record_fetch_ok();
                let entry = CacheEntry::new(records);
                if let Err(e) = self.cache.write_entry(dataset.cache_name(), &entry).await {
                    error!(dataset = %dataset, "Cache write failed: {e}");
                }
                info!(dataset = %dataset, count = entry.count, "Fetched fresh data");
                let fetched_at = entry.timestamp;
                Aggregated::new(filter_records(entry.data, period, Utc::now()), DataStatus::Fresh, fetched_at)
            }
            Err(e) => {
                self.health.record_fetch_failed();
                error!(dataset = %dataset, "Fetch failed: {e}");
                match self.cached::<T>().await {
                    Some(entry) => {
                        let mut stale = self.serve_cached(entry, period, DataStatus::Stale);
                        stale.error = Some(e.to_string());
                        stale
                    }
                    None => Aggregated::failed(e.to_string()),
                }
            }
        }
    }

    fn serve_cached<T: Record>(&self, entry: CacheEntry<T>, period: Period, status: DataStatus) -> Aggregated<T> {
        if status == DataStatus::Cached {
            self.health.record_cache_hit();
        }
        Aggregated::new(filter_records(entry.data, period, Utc::now()), status, entry.timestamp)
    }
}
