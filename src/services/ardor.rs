//! Ardor fetch + normalize pipelines, one per activity type.

use futures_util::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::clients::ArdorClient;
use crate::config::{Config, ASSET_FETCH_CONCURRENCY};
use crate::error::Result;
use crate::normalize::ardor::{
    card_catalog, normalize_burn, normalize_craft, normalize_giftz_sale, normalize_trade,
    pair_morphs, parse_transfer, CardCatalog,
};
use crate::normalize::users::{Activity, UserAccumulator};
use crate::types::{Burn, Chain, Craft, GiftzSale, Morph, Trade};

const GIFTZ_FALLBACK_NAME: &str = "Giftz";

#[derive(Clone)]
pub struct ArdorService {
    client: ArdorClient,
    cfg: Config,
}

impl ArdorService {
    pub fn new(client: ArdorClient, cfg: Config) -> Self {
        Self { client, cfg }
    }

    /// Every card asset issued by the card issuer, keyed by asset id.
    pub async fn card_catalog(&self) -> Result<CardCatalog> {
        let assets = self.client.get_assets_by_issuer(&self.cfg.card_issuer).await?;
        let catalog = card_catalog(&assets);
        debug!(cards = catalog.len(), "Loaded card catalog");
        Ok(catalog)
    }

    pub async fn fetch_trades(&self) -> Result<Vec<Trade>> {
        let catalog = self.card_catalog().await?;
        let raw = per_asset(&catalog, |asset| self.client.get_trades(asset)).await?;
        let mut trades: Vec<Trade> = raw
            .iter()
            .filter_map(|t| normalize_trade(t, &catalog))
            .collect();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        info!(count = trades.len(), skipped = raw.len() - trades.len(), "Ardor trades normalized");
        Ok(trades)
    }

    pub async fn fetch_burns(&self) -> Result<Vec<Burn>> {
        let catalog = self.card_catalog().await?;
        let burn_account = &self.cfg.burn_account;
        let raw = self.client.get_account_transfers(burn_account).await?;
        let mut burns: Vec<Burn> = raw
            .iter()
            .filter(|t| is_card(t, &catalog) && account_field(t, "recipient") == Some(burn_account.as_str()))
            .filter_map(|t| normalize_burn(t, &catalog))
            .collect();
        burns.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(burns)
    }

    pub async fn fetch_crafts(&self) -> Result<Vec<Craft>> {
        let catalog = self.card_catalog().await?;
        let craft_account = &self.cfg.craft_account;
        let raw = self.client.get_account_transfers(craft_account).await?;
        let mut crafts: Vec<Craft> = raw
            .iter()
            .filter(|t| is_card(t, &catalog) && account_field(t, "sender") == Some(craft_account.as_str()))
            .filter_map(|t| normalize_craft(t, &catalog))
            .collect();
        crafts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(crafts)
    }

    pub async fn fetch_morphs(&self) -> Result<Vec<Morph>> {
        let catalog = self.card_catalog().await?;
        let raw = self.client.get_account_transfers(&self.cfg.morph_account).await?;
        let transfers: Vec<_> = raw
            .iter()
            .filter(|t| is_card(t, &catalog))
            .filter_map(|t| parse_transfer(t, &catalog))
            .collect();
        Ok(pair_morphs(&transfers, &self.cfg.morph_account))
    }

    pub async fn fetch_giftz_sales(&self) -> Result<Vec<GiftzSale>> {
        let asset = &self.cfg.giftz_asset;
        let item_name = match self.client.get_asset(asset).await {
            Ok(info) => info
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or(GIFTZ_FALLBACK_NAME)
                .to_string(),
            Err(e) => {
                debug!("getAsset {asset} failed, using fallback name: {e}");
                GIFTZ_FALLBACK_NAME.to_string()
            }
        };
        let raw = self.client.get_trades(asset).await?;
        let mut sales: Vec<GiftzSale> = raw
            .iter()
            .filter_map(|t| normalize_giftz_sale(t, &item_name))
            .collect();
        sales.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(sales)
    }

    /// Feed every Ardor card trade and card transfer into `acc`.
    pub async fn collect_users(&self, acc: &mut UserAccumulator) -> Result<()> {
        let catalog = self.card_catalog().await?;
        let (trades, transfers) = tokio::try_join!(
            per_asset(&catalog, |asset| self.client.get_trades(asset)),
            per_asset(&catalog, |asset| self.client.get_asset_transfers(asset)),
        )?;

        for t in trades.iter().filter_map(|t| normalize_trade(t, &catalog)) {
            acc.observe(Chain::Ardor, &t.buyer, t.timestamp, Activity::Trade);
            acc.observe(Chain::Ardor, &t.seller, t.timestamp, Activity::Trade);
            acc.observe(Chain::Ardor, &t.buyer, t.timestamp, Activity::Purchase);
        }
        for t in transfers.iter().filter_map(|t| parse_transfer(t, &catalog)) {
            let received = if t.sender == self.cfg.craft_account {
                Activity::Mint
            } else {
                Activity::Transfer
            };
            acc.observe(Chain::Ardor, &t.sender, t.timestamp, Activity::Transfer);
            acc.observe(Chain::Ardor, &t.recipient, t.timestamp, received);
        }
        Ok(())
    }
}

/// Run `fetch` for every card asset with bounded concurrency and flatten the results.
/// The first failure fails the whole batch.
async fn per_asset<'a, F, Fut>(catalog: &'a CardCatalog, fetch: F) -> Result<Vec<Value>>
where
    F: Fn(&'a str) -> Fut + Send + 'a,
    Fut: std::future::Future<Output = Result<Vec<Value>>> + Send + 'a,
{
    let batches: Vec<Vec<Value>> = stream::iter(catalog.keys().map(String::as_str).map(fetch))
        .boxed()
        .buffer_unordered(ASSET_FETCH_CONCURRENCY)
        .try_collect()
        .await?;
    Ok(batches.into_iter().flatten().collect())
}

fn is_card(v: &Value, catalog: &CardCatalog) -> bool {
    v.get("asset")
        .and_then(|a| a.as_str().map(str::to_string).or_else(|| a.as_u64().map(|n| n.to_string())))
        .is_some_and(|a| catalog.contains_key(&a))
}

/// Reed-Solomon form of an account field, falling back to the numeric id.
fn account_field<'a>(v: &'a Value, field: &str) -> Option<&'a str> {
    v.get(format!("{field}RS").as_str())
        .or_else(|| v.get(field))
        .and_then(|a| a.as_str())
}
