mod amounts;
mod api;
mod cache;
mod clients;
mod config;
mod error;
mod filter;
mod normalize;
mod services;
mod time_utils;
mod types;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::services::{AggregationService, CacheWarmer};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment alone is enough.
    let _ = dotenvy::dotenv();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        "Ardor node {} (chain {}), indexing API {} contract {}",
        cfg.ardor_endpoint(),
        cfg.chain_id,
        cfg.polygon_api_url,
        cfg.polygon_contract,
    );
    info!(
        "Retry policy: {} retries, {}ms delay, {}ms timeout; cache dir {}",
        cfg.max_retries,
        cfg.retry_delay.as_millis(),
        cfg.request_timeout.as_millis(),
        cfg.storage_dir,
    );

    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let service = Arc::new(AggregationService::new(
        cfg.clone(),
        Arc::clone(&health),
        Arc::clone(&latency),
    )?);

    // Cache warmer (background, every CACHE_REFRESH_SECS)
    if cfg.cache_refresh_secs > 0 {
        let warmer = CacheWarmer::new(Arc::clone(&service), Duration::from_secs(cfg.cache_refresh_secs));
        tokio::spawn(async move { warmer.run().await });
        info!("Cache warmer every {}s", cfg.cache_refresh_secs);
    } else {
        info!("Cache warmer disabled (CACHE_REFRESH_SECS=0)");
    }

    // HTTP API server
    let api_state = ApiState {
        service,
        latency,
        started: Instant::now(),
    };
    let app = router(api_state, &cfg.allowed_origins);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
