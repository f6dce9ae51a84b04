//! Polygon fetch + normalize pipelines.

use tracing::{info, warn};

use crate::clients::PolygonClient;
use crate::config::Config;
use crate::error::Result;
use crate::normalize::polygon::{block_times, normalize_sale, parse_transfer, token_names, NftTransfer};
use crate::normalize::users::{Activity, UserAccumulator};
use crate::types::{Chain, Trade};

#[derive(Clone)]
pub struct PolygonService {
    client: PolygonClient,
    contract: String,
}

impl PolygonService {
    pub fn new(client: PolygonClient, cfg: &Config) -> Self {
        Self {
            client,
            contract: cfg.polygon_contract.clone(),
        }
    }

    async fn transfers(&self) -> Result<Vec<NftTransfer>> {
        let raw = self.client.get_asset_transfers(&self.contract).await?;
        Ok(raw.iter().filter_map(parse_transfer).collect())
    }

    /// Marketplace sales. Token names and block times come from the token
    /// metadata and transfer endpoints; a metadata failure only costs names.
    pub async fn fetch_trades(&self) -> Result<Vec<Trade>> {
        let (sales, nfts, transfers) = tokio::join!(
            self.client.get_nft_sales(&self.contract),
            self.client.get_nfts_for_contract(&self.contract),
            self.transfers(),
        );
        let sales = sales?;
        let transfers = transfers?;
        let names = match nfts {
            Ok(nfts) => token_names(&nfts),
            Err(e) => {
                warn!("Token metadata unavailable, sales will show token ids: {e}");
                Default::default()
            }
        };

        let times = block_times(&transfers);
        let mut trades: Vec<Trade> = sales
            .iter()
            .filter_map(|s| normalize_sale(s, &names, &times))
            .collect();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        info!(count = trades.len(), skipped = sales.len() - trades.len(), "Polygon sales normalized");
        Ok(trades)
    }

    /// Feed every transfer and sale of the contract into `acc`.
    pub async fn collect_users(&self, acc: &mut UserAccumulator) -> Result<()> {
        let (sales, transfers) = tokio::try_join!(
            self.client.get_nft_sales(&self.contract),
            self.transfers(),
        )?;

        for t in &transfers {
            if t.is_mint() {
                acc.observe(Chain::Polygon, &t.to, t.timestamp, Activity::Mint);
            } else {
                acc.observe(Chain::Polygon, &t.from, t.timestamp, Activity::Transfer);
                acc.observe(Chain::Polygon, &t.to, t.timestamp, Activity::Transfer);
            }
        }

        let times = block_times(&transfers);
        let names = Default::default();
        for sale in sales.iter().filter_map(|s| normalize_sale(s, &names, &times)) {
            acc.observe(Chain::Polygon, &sale.buyer, sale.timestamp, Activity::Trade);
            acc.observe(Chain::Polygon, &sale.seller, sale.timestamp, Activity::Trade);
            acc.observe(Chain::Polygon, &sale.buyer, sale.timestamp, Activity::Purchase);
        }
        Ok(())
    }
}
