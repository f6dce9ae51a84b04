//! NFT indexing API records → normalized records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::amounts::{format_wei, format_wei_decimal, sum_wei};
use crate::config::NULL_EVM_ADDRESS;
use crate::time_utils::parse_timestamp_value;
use crate::types::{Chain, Trade};

const DEFAULT_CURRENCY: &str = "MATIC";
const FEE_FIELDS: [&str; 3] = ["sellerFee", "protocolFee", "royaltyFee"];

/// Token ids arrive as decimal strings from the NFT endpoints and as `0x`
/// hex from transfers. Both normalize to decimal.
pub fn normalize_token_id(raw: &str) -> Option<String> {
    let s = raw.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16).ok().map(|n| n.to_string()),
        None if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            let trimmed = s.trim_start_matches('0');
            Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
        }
        None => None,
    }
}

/// tokenId → display name from `getNFTsForContract` entries.
pub fn token_names(nfts: &[Value]) -> HashMap<String, String> {
    nfts.iter()
        .filter_map(|n| {
            let id = n.get("tokenId").and_then(|t| t.as_str()).and_then(normalize_token_id)?;
            let name = n
                .get("name")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .or_else(|| n.pointer("/raw/metadata/name").and_then(|v| v.as_str()))
                .or_else(|| n.get("title").and_then(|v| v.as_str()))
                .filter(|s| !s.is_empty())?;
            Some((id, name.to_string()))
        })
        .collect()
}

/// One ERC-1155 transfer with its tokens, lowercase addresses.
#[derive(Debug, Clone)]
pub struct NftTransfer {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    /// (token id, quantity)
    pub tokens: Vec<(String, u64)>,
}

impl NftTransfer {
    pub fn is_mint(&self) -> bool {
        self.from == NULL_EVM_ADDRESS
    }
}

pub fn parse_transfer(v: &Value) -> Option<NftTransfer> {
    let hash = v.get("hash").and_then(|h| h.as_str())?.to_string();
    let timestamp = parse_timestamp_value(v.pointer("/metadata/blockTimestamp")?)?;
    let tokens = v
        .get("erc1155Metadata")
        .and_then(|m| m.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|m| {
                    let id = m.get("tokenId").and_then(|t| t.as_str()).and_then(normalize_token_id)?;
                    let qty = m
                        .get("value")
                        .and_then(|q| q.as_str())
                        .and_then(parse_quantity)
                        .unwrap_or(1);
                    Some((id, qty))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(NftTransfer {
        hash,
        timestamp,
        from: address(v, "from")?,
        to: address(v, "to")?,
        tokens,
    })
}

/// Transaction hash → block time. Sales carry no timestamp of their own.
pub fn block_times(transfers: &[NftTransfer]) -> HashMap<String, DateTime<Utc>> {
    transfers
        .iter()
        .map(|t| (t.hash.to_ascii_lowercase(), t.timestamp))
        .collect()
}

/// A marketplace sale. Price is the sum of seller, protocol and royalty fees.
/// Sales whose time cannot be resolved are dropped.
pub fn normalize_sale(
    v: &Value,
    names: &HashMap<String, String>,
    times: &HashMap<String, DateTime<Utc>>,
) -> Option<Trade> {
    let tx = v.get("transactionHash").and_then(|h| h.as_str())?;
    let token_id = v.get("tokenId").and_then(|t| t.as_str()).and_then(normalize_token_id)?;

    let timestamp = v
        .get("blockTimestamp")
        .or_else(|| v.get("timestamp"))
        .and_then(parse_timestamp_value)
        .or_else(|| times.get(&tx.to_ascii_lowercase()).copied())?;

    let fees: Vec<&str> = FEE_FIELDS
        .iter()
        .filter_map(|f| v.get(*f).and_then(|fee| fee.get("amount")).and_then(|a| a.as_str()))
        .collect();
    let price = match fees.as_slice() {
        [single] => format_wei(Some(*single)),
        many => format_wei_decimal(sum_wei(many.iter().copied())),
    };
    let currency = v
        .pointer("/sellerFee/symbol")
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CURRENCY);
    let log_index = v
        .get("logIndex")
        .map(|l| l.as_u64().map(|n| n.to_string()).unwrap_or_else(|| l.as_str().unwrap_or("0").to_string()))
        .unwrap_or_else(|| "0".to_string());

    Some(Trade {
        id: format!("{tx}:{log_index}"),
        timestamp,
        card_name: names
            .get(&token_id)
            .cloned()
            .unwrap_or_else(|| format!("#{token_id}")),
        buyer: address(v, "buyerAddress")?,
        seller: address(v, "sellerAddress")?,
        price,
        currency: currency.to_string(),
        quantity: v
            .get("quantity")
            .and_then(|q| q.as_str().and_then(parse_quantity).or_else(|| q.as_u64()))
            .unwrap_or(1),
        chain: Chain::Polygon,
        asset_id: token_id,
    })
}

fn address(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|a| a.as_str())
        .filter(|a| !a.is_empty())
        .map(str::to_ascii_lowercase)
}

fn parse_quantity(raw: &str) -> Option<u64> {
    match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transfer(hash: &str, from: &str, to: &str, ts: &str) -> Value {
        json!({
            "hash": hash,
            "from": from,
            "to": to,
            "erc1155Metadata": [{ "tokenId": "0x0a", "value": "0x2" }],
            "metadata": { "blockTimestamp": ts },
        })
    }

    #[test]
    fn token_ids_normalize_to_decimal() {
        assert_eq!(normalize_token_id("0x0a").as_deref(), Some("10"));
        assert_eq!(normalize_token_id("10").as_deref(), Some("10"));
        assert_eq!(normalize_token_id("007").as_deref(), Some("7"));
        assert_eq!(normalize_token_id("0").as_deref(), Some("0"));
        assert!(normalize_token_id("abc").is_none());
    }

    #[test]
    fn names_fall_back_to_raw_metadata() {
        let names = token_names(&[
            json!({ "tokenId": "1", "name": "Kraken" }),
            json!({ "tokenId": "2", "name": null, "raw": { "metadata": { "name": "Hydra" } } }),
            json!({ "tokenId": "3" }),
        ]);
        assert_eq!(names["1"], "Kraken");
        assert_eq!(names["2"], "Hydra");
        assert!(!names.contains_key("3"));
    }

    #[test]
    fn transfer_parses_tokens_and_mint_flag() {
        let t = parse_transfer(&transfer("0xAB", NULL_EVM_ADDRESS, "0xUser", "2024-03-01T00:00:00Z")).unwrap();
        assert!(t.is_mint());
        assert_eq!(t.to, "0xuser");
        assert_eq!(t.tokens, vec![("10".to_string(), 2)]);
    }

    #[test]
    fn sale_price_sums_all_fees() {
        let transfers = vec![parse_transfer(&transfer("0xabc", "0xs", "0xb", "2024-03-01T12:00:00Z")).unwrap()];
        let times = block_times(&transfers);
        let names = HashMap::from([("10".to_string(), "Kraken".to_string())]);
        let sale = json!({
            "transactionHash": "0xABC",
            "logIndex": 7,
            "tokenId": "10",
            "quantity": "1",
            "buyerAddress": "0xB",
            "sellerAddress": "0xS",
            "sellerFee": { "amount": "1000000000000000000", "symbol": "WETH" },
            "protocolFee": { "amount": "250000000000000000" },
            "royaltyFee": { "amount": "250000000000000000" },
        });

        let trade = normalize_sale(&sale, &names, &times).unwrap();
        assert_eq!(trade.price, "1.50");
        assert_eq!(trade.currency, "WETH");
        assert_eq!(trade.card_name, "Kraken");
        assert_eq!(trade.id, "0xABC:7");
        assert_eq!(trade.buyer, "0xb");
        assert_eq!(trade.chain, Chain::Polygon);
        assert_eq!(trade.timestamp.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn sale_without_resolvable_time_is_dropped() {
        let sale = json!({
            "transactionHash": "0xdead", "tokenId": "1",
            "buyerAddress": "0xb", "sellerAddress": "0xs",
            "sellerFee": { "amount": "1" },
        });
        assert!(normalize_sale(&sale, &HashMap::new(), &HashMap::new()).is_none());
    }

    #[test]
    fn single_fee_sale_is_priced_from_that_fee() {
        let sale = json!({
            "transactionHash": "0x2", "tokenId": "5", "blockTimestamp": "2024-01-01T00:00:00Z",
            "buyerAddress": "0xb", "sellerAddress": "0xs",
            "sellerFee": { "amount": "1500000000000000000", "symbol": "WETH" },
        });
        let trade = normalize_sale(&sale, &HashMap::new(), &HashMap::new()).unwrap();
        assert_eq!(trade.price, "1.50");
        assert_eq!(trade.currency, "WETH");
    }

    #[test]
    fn sale_currency_defaults_to_matic() {
        let sale = json!({
            "transactionHash": "0x1", "tokenId": "5", "blockTimestamp": "2024-01-01T00:00:00Z",
            "buyerAddress": "0xb", "sellerAddress": "0xs",
        });
        let trade = normalize_sale(&sale, &HashMap::new(), &HashMap::new()).unwrap();
        assert_eq!(trade.currency, "MATIC");
        assert_eq!(trade.price, "0.00");
        assert_eq!(trade.card_name, "#5");
        assert_eq!(trade.quantity, 1);
    }
}
