use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::latency::LatencyStats;
use crate::clients::retry::{read_json, with_retry, RetryPolicy};
use crate::config::{Config, MAX_PAGES};
use crate::error::{AppError, Result};

/// Client for the NFT indexing API (REST NFT endpoints + JSON-RPC transfers).
#[derive(Clone)]
pub struct PolygonClient {
    http: reqwest::Client,
    /// `{base}/nft/v3/{key}`
    nft_base: String,
    /// `{base}/v2/{key}`
    rpc_url: String,
    policy: RetryPolicy,
    latency: Arc<LatencyStats>,
}

/// Paginated queries. Each knows its list field and where the cursor lives.
#[derive(Debug, Clone, Copy)]
enum PagedQuery<'a> {
    NftSales { contract: &'a str },
    NftsForContract { contract: &'a str },
    AssetTransfers { contract: &'a str },
}

impl PagedQuery<'_> {
    fn label(&self) -> &'static str {
        match self {
            PagedQuery::NftSales { .. } => "getNFTSales",
            PagedQuery::NftsForContract { .. } => "getNFTsForContract",
            PagedQuery::AssetTransfers { .. } => "alchemy_getAssetTransfers",
        }
    }

    fn list_key(&self) -> &'static str {
        match self {
            PagedQuery::NftSales { .. } => "nftSales",
            PagedQuery::NftsForContract { .. } => "nfts",
            PagedQuery::AssetTransfers { .. } => "transfers",
        }
    }
}

impl PolygonClient {
    pub fn new(cfg: &Config, latency: Arc<LatencyStats>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        let base = cfg.polygon_api_url.trim_end_matches('/');
        Ok(Self {
            http,
            nft_base: format!("{base}/nft/v3/{}", cfg.alchemy_api_key),
            rpc_url: format!("{base}/v2/{}", cfg.alchemy_api_key),
            policy: RetryPolicy::from_config(cfg),
            latency,
        })
    }

    /// Marketplace sales of `contract`, newest first.
    pub async fn get_nft_sales(&self, contract: &str) -> Result<Vec<Value>> {
        self.collect_pages(PagedQuery::NftSales { contract }).await
    }

    /// Token metadata for every token of `contract`.
    pub async fn get_nfts_for_contract(&self, contract: &str) -> Result<Vec<Value>> {
        self.collect_pages(PagedQuery::NftsForContract { contract }).await
    }

    /// ERC-1155 transfers (mints included) of `contract`, with block timestamps.
    pub async fn get_asset_transfers(&self, contract: &str) -> Result<Vec<Value>> {
        self.collect_pages(PagedQuery::AssetTransfers { contract }).await
    }

    async fn collect_pages(&self, query: PagedQuery<'_>) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        let mut page_key: Option<String> = None;

        for page in 0..MAX_PAGES {
            let body = self.fetch_page(query, page_key.as_deref()).await?;
            let items = body
                .get(query.list_key())
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    AppError::UnexpectedResponse(format!(
                        "{}: missing '{}' array",
                        query.label(),
                        query.list_key()
                    ))
                })?;
            out.extend(items.iter().cloned());

            page_key = body
                .get("pageKey")
                .and_then(|k| k.as_str())
                .filter(|k| !k.is_empty())
                .map(str::to_string);
            if page_key.is_none() {
                break;
            }
            if page + 1 == MAX_PAGES {
                warn!("{}: stopped after {MAX_PAGES} pages, results truncated", query.label());
            }
        }

        debug!("{}: {} records", query.label(), out.len());
        Ok(out)
    }

    /// One page; for JSON-RPC queries this returns the unwrapped `result` object.
    async fn fetch_page(&self, query: PagedQuery<'_>, page_key: Option<&str>) -> Result<Value> {
        match query {
            PagedQuery::NftSales { contract } => {
                let mut params = vec![
                    ("contractAddress", contract.to_string()),
                    ("order", "desc".to_string()),
                    ("limit", "1000".to_string()),
                ];
                if let Some(k) = page_key {
                    params.push(("pageKey", k.to_string()));
                }
                let url = format!("{}/getNFTSales", self.nft_base);
                self.get(query.label(), &url, &params).await
            }
            PagedQuery::NftsForContract { contract } => {
                let mut params = vec![
                    ("contractAddress", contract.to_string()),
                    ("withMetadata", "true".to_string()),
                    ("limit", "100".to_string()),
                ];
                if let Some(k) = page_key {
                    params.push(("pageKey", k.to_string()));
                }
                let url = format!("{}/getNFTsForContract", self.nft_base);
                self.get(query.label(), &url, &params).await
            }
            PagedQuery::AssetTransfers { contract } => {
                let mut filter = json!({
                    "fromBlock": "0x0",
                    "toBlock": "latest",
                    "contractAddresses": [contract],
                    "category": ["erc1155"],
                    "withMetadata": true,
                    "excludeZeroValue": false,
                    "maxCount": "0x3e8",
                });
                if let Some(k) = page_key {
                    filter["pageKey"] = json!(k);
                }
                self.rpc(query.label(), filter).await
            }
        }
    }

    async fn get(&self, label: &str, url: &str, params: &[(&str, String)]) -> Result<Value> {
        with_retry(self.policy, label, &self.latency, || async {
            let resp = self.http.get(url).query(params).send().await?;
            let body = read_json(resp).await?;
            check_app_error(&body)?;
            Ok(body)
        })
        .await
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [params],
        });
        let payload = &payload;
        with_retry(self.policy, method, &self.latency, || async {
            let resp = self.http.post(&self.rpc_url).json(payload).send().await?;
            let body = read_json(resp).await?;
            check_app_error(&body)?;
            body.get("result")
                .cloned()
                .ok_or_else(|| AppError::UnexpectedResponse(format!("{method}: missing 'result'")))
        })
        .await
    }
}

/// JSON-RPC `error` objects and REST `error` strings both count as failures.
fn check_app_error(body: &Value) -> Result<()> {
    let Some(err) = body.get("error").filter(|e| !e.is_null()) else {
        return Ok(());
    };
    let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
    let message = err
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| err.as_str())
        .unwrap_or("unknown error")
        .to_string();
    Err(AppError::UpstreamApp { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeResponse, FakeUpstream};

    fn client_for(upstream: &FakeUpstream) -> PolygonClient {
        let cfg = Config::for_tests(&upstream.base_url, "unused");
        PolygonClient::new(&cfg, Arc::new(LatencyStats::new())).unwrap()
    }

    #[tokio::test]
    async fn follows_page_keys() {
        let upstream = FakeUpstream::start(|req| {
            assert_eq!(req.path, "/nft/v3/test/getNFTSales");
            assert_eq!(req.param("contractAddress"), Some("0xcards"));
            match req.param("pageKey") {
                None => FakeResponse::ok(json!({ "nftSales": [{ "tokenId": "1" }], "pageKey": "p2" })),
                Some("p2") => FakeResponse::ok(json!({ "nftSales": [{ "tokenId": "2" }], "pageKey": null })),
                Some(other) => panic!("unexpected pageKey {other}"),
            }
        })
        .await;

        let sales = client_for(&upstream).get_nft_sales("0xcards").await.unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(upstream.hits(), 2);
    }

    #[tokio::test]
    async fn rpc_unwraps_result() {
        let upstream = FakeUpstream::start(|req| {
            assert_eq!(req.path, "/v2/test");
            let body = req.body.as_ref().expect("json body");
            assert_eq!(body["method"], "alchemy_getAssetTransfers");
            assert_eq!(body["params"][0]["contractAddresses"][0], "0xcards");
            FakeResponse::ok(json!({ "jsonrpc": "2.0", "id": 1, "result": { "transfers": [{ "hash": "0x1" }] } }))
        })
        .await;

        let transfers = client_for(&upstream).get_asset_transfers("0xcards").await.unwrap();
        assert_eq!(transfers.len(), 1);
    }

    #[tokio::test]
    async fn rpc_error_object_is_a_failure() {
        let upstream = FakeUpstream::start(|_| {
            FakeResponse::ok(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "invalid params" } }))
        })
        .await;

        let err = client_for(&upstream).get_asset_transfers("0xcards").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamApp { code: -32602, .. }), "{err}");
        assert_eq!(upstream.hits(), 3);
    }
}
