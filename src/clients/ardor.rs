use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::latency::LatencyStats;
use crate::clients::retry::{read_json, with_retry, RetryPolicy};
use crate::config::{Config, ARDOR_PAGE_SIZE, MAX_PAGES};
use crate::error::{AppError, Result};

/// Ardor node client: one GET per `requestType`, parameters forwarded as-is.
#[derive(Clone)]
pub struct ArdorClient {
    http: reqwest::Client,
    endpoint: String,
    chain_id: u32,
    policy: RetryPolicy,
    latency: Arc<LatencyStats>,
}

impl ArdorClient {
    pub fn new(cfg: &Config, latency: Arc<LatencyStats>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: cfg.ardor_endpoint(),
            chain_id: cfg.chain_id,
            policy: RetryPolicy::from_config(cfg),
            latency,
        })
    }

    /// Issue `requestType` with `params`, retrying per policy.
    /// A body carrying `errorCode` is a failure even on HTTP 200.
    pub async fn request(&self, request_type: &str, params: &[(&str, String)]) -> Result<Value> {
        let mut query: Vec<(String, String)> = Vec::with_capacity(params.len() + 2);
        query.push(("requestType".to_string(), request_type.to_string()));
        query.push(("chain".to_string(), self.chain_id.to_string()));
        query.extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));

        let query = &query;
        with_retry(self.policy, request_type, &self.latency, || self.send(query)).await
    }

    async fn send(&self, query: &[(String, String)]) -> Result<Value> {
        let resp = self.http.get(&self.endpoint).query(query).send().await?;
        let body = read_json(resp).await?;
        check_app_error(&body)?;
        Ok(body)
    }

    /// Every asset issued by `account`. The node nests results per account.
    pub async fn get_assets_by_issuer(&self, account: &str) -> Result<Vec<Value>> {
        self.collect_pages(
            "getAssetsByIssuer",
            &[("account", account.to_string())],
            "assets",
        )
        .await
    }

    /// Asset properties (name, description, decimals, quantity).
    pub async fn get_asset(&self, asset: &str) -> Result<Value> {
        self.request("getAsset", &[("asset", asset.to_string())]).await
    }

    /// All trades of one asset, newest first.
    pub async fn get_trades(&self, asset: &str) -> Result<Vec<Value>> {
        self.collect_pages(
            "getTrades",
            &[
                ("asset", asset.to_string()),
                ("includeAssetInfo", "true".to_string()),
            ],
            "trades",
        )
        .await
    }

    /// All asset transfers where `account` is sender or recipient.
    pub async fn get_account_transfers(&self, account: &str) -> Result<Vec<Value>> {
        self.collect_pages(
            "getAssetTransfers",
            &[
                ("account", account.to_string()),
                ("includeAssetInfo", "true".to_string()),
            ],
            "transfers",
        )
        .await
    }

    /// All transfers of one asset.
    pub async fn get_asset_transfers(&self, asset: &str) -> Result<Vec<Value>> {
        self.collect_pages(
            "getAssetTransfers",
            &[
                ("asset", asset.to_string()),
                ("includeAssetInfo", "true".to_string()),
            ],
            "transfers",
        )
        .await
    }

    /// Page through `firstIndex`/`lastIndex` until a short page comes back.
    /// Nested lists (`getAssetsByIssuer`) are flattened and the node windows
    /// the inner records, so a page is measured in flattened records.
    async fn collect_pages(
        &self,
        request_type: &str,
        params: &[(&str, String)],
        list_key: &str,
    ) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        let mut first = 0u32;

        for page in 0..MAX_PAGES {
            let mut page_params = params.to_vec();
            page_params.push(("firstIndex", first.to_string()));
            page_params.push(("lastIndex", (first + ARDOR_PAGE_SIZE - 1).to_string()));

            let body = self.request(request_type, &page_params).await?;
            let items = body
                .get(list_key)
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    AppError::UnexpectedResponse(format!("{request_type}: missing '{list_key}' array"))
                })?;

            let before = out.len();
            for item in items {
                match item.as_array() {
                    Some(nested) => out.extend(nested.iter().cloned()),
                    None => out.push(item.clone()),
                }
            }

            if out.len() - before < ARDOR_PAGE_SIZE as usize {
                break;
            }
            if page + 1 == MAX_PAGES {
                warn!("{request_type}: stopped after {MAX_PAGES} pages, results truncated");
            }
            first += ARDOR_PAGE_SIZE;
        }

        debug!("{request_type}: {} records", out.len());
        Ok(out)
    }
}

fn check_app_error(body: &Value) -> Result<()> {
    let Some(code) = body.get("errorCode") else {
        return Ok(());
    };
    let code = code
        .as_i64()
        .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(-1);
    let message = body
        .get("errorDescription")
        .and_then(|d| d.as_str())
        .unwrap_or("unknown error")
        .to_string();
    Err(AppError::UpstreamApp { code, message })
}
