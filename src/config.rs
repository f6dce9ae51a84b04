use std::time::Duration;

use crate::error::{AppError, Result};

pub const NODE_URL: &str = "https://ardor.jelurida.com";
pub const API_PATH: &str = "/nxt";
pub const POLYGON_API_URL: &str = "https://polygon-mainnet.g.alchemy.com";

/// Ardor genesis: 2018-01-01T00:00:00Z in Unix milliseconds.
/// Every chain-native timestamp in the crate is converted through this one value.
pub const ARDOR_EPOCH_MS: i64 = 1_514_764_800_000;

/// Raw numeric timestamps below this are chain-native seconds; at or above, Unix milliseconds.
pub const CHAIN_SECONDS_THRESHOLD: i64 = 10_000_000_000;

/// Fixed-point scale of Ardor amounts (NQT / QNT with 8 decimals).
pub const ARDOR_DECIMALS: u32 = 8;

/// Wei scale on the EVM chain.
pub const WEI_DECIMALS: u32 = 18;

/// Ardor nodes cap list responses at 100 records per request.
pub const ARDOR_PAGE_SIZE: u32 = 100;

/// Safety stop for paginated list calls on either chain API.
pub const MAX_PAGES: usize = 50;

/// How many per-asset `getTrades` calls may be in flight at once.
pub const ASSET_FETCH_CONCURRENCY: usize = 4;

/// Lower-tier cards consumed by one craft.
pub const CARDS_PER_CRAFT: u32 = 5;

pub const NULL_EVM_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

pub mod defaults {
    pub const CHAIN_ID: u32 = 2;
    pub const REQUEST_TIMEOUT_MS: u64 = 30_000;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 2_000;
    pub const CACHE_REFRESH_SECS: u64 = 300;

    pub const CARD_ISSUER: &str = "ARDOR-4V3B-TVQA-Q6LF-GMH3T";
    pub const GIFTZ_ASSET: &str = "13187825386854631652";
    pub const BURN_ACCOUNT: &str = "ARDOR-Q9KZ-74XD-WERK-CV6GB";
    pub const CRAFT_ACCOUNT: &str = "ARDOR-5NCL-DRBZ-XBWF-DDN5T";
    pub const MORPH_ACCOUNT: &str = "ARDOR-7ACX-RSP6-KN3U-B3Q2S";
    pub const POLYGON_CONTRACT: &str = "0xcf55f528492768330c0750a6527c1dfb50e2a7c3";
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node_url: String,
    pub api_path: String,
    pub chain_id: u32,
    pub request_timeout: Duration,
    /// Retries after the first attempt (MAX_RETRIES).
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// CORS allow-list (ALLOWED_ORIGINS, comma-separated). `*` means any origin.
    pub allowed_origins: Vec<String>,
    pub polygon_api_url: String,
    pub alchemy_api_key: String,
    pub polygon_contract: String,
    pub card_issuer: String,
    pub giftz_asset: String,
    pub burn_account: String,
    pub craft_account: String,
    pub morph_account: String,
    pub storage_dir: String,
    pub api_port: u16,
    pub log_level: String,
    /// Background warmer interval. Zero disables it (CACHE_REFRESH_SECS).
    pub cache_refresh_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            node_url: env_or("NODE_URL", NODE_URL),
            api_path: env_or("API_PATH", API_PATH),
            chain_id: parse_or("CHAIN_ID", defaults::CHAIN_ID),
            request_timeout: Duration::from_millis(parse_or(
                "REQUEST_TIMEOUT",
                defaults::REQUEST_TIMEOUT_MS,
            )),
            max_retries: parse_or("MAX_RETRIES", defaults::MAX_RETRIES),
            retry_delay: Duration::from_millis(parse_or("RETRY_DELAY", defaults::RETRY_DELAY_MS)),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            polygon_api_url: env_or("POLYGON_API_URL", POLYGON_API_URL),
            alchemy_api_key: env_or("ALCHEMY_API_KEY", "demo"),
            polygon_contract: env_or("POLYGON_CONTRACT", defaults::POLYGON_CONTRACT),
            card_issuer: env_or("CARD_ISSUER", defaults::CARD_ISSUER),
            giftz_asset: env_or("GIFTZ_ASSET", defaults::GIFTZ_ASSET),
            burn_account: env_or("BURN_ACCOUNT", defaults::BURN_ACCOUNT),
            craft_account: env_or("CRAFT_ACCOUNT", defaults::CRAFT_ACCOUNT),
            morph_account: env_or("MORPH_ACCOUNT", defaults::MORPH_ACCOUNT),
            storage_dir: env_or("STORAGE_DIR", "storage"),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: env_or("LOG_LEVEL", "info"),
            cache_refresh_secs: parse_or("CACHE_REFRESH_SECS", defaults::CACHE_REFRESH_SECS),
        })
    }

    /// Full Ardor API endpoint, e.g. `https://node/nxt`.
    pub fn ardor_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.node_url.trim_end_matches('/'),
            self.api_path
        )
    }

    /// Config pointing both chains at `base_url`, used by tests with an in-process fake node.
    #[cfg(test)]
    pub fn for_tests(base_url: &str, storage_dir: &str) -> Self {
        Self {
            node_url: base_url.to_string(),
            api_path: API_PATH.to_string(),
            chain_id: defaults::CHAIN_ID,
            request_timeout: Duration::from_millis(500),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            allowed_origins: vec!["*".to_string()],
            polygon_api_url: base_url.to_string(),
            alchemy_api_key: "test".to_string(),
            polygon_contract: "0xcards".to_string(),
            card_issuer: "ARDOR-ISSU-ER00-0000-00000".to_string(),
            giftz_asset: "999".to_string(),
            burn_account: "ARDOR-BURN-0000-0000-00000".to_string(),
            craft_account: "ARDOR-CRAF-T000-0000-00000".to_string(),
            morph_account: "ARDOR-MORP-H000-0000-00000".to_string(),
            storage_dir: storage_dir.to_string(),
            api_port: 0,
            log_level: "debug".to_string(),
            cache_refresh_secs: 0,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
