//! Ardor node records → normalized records.
//!
//! Ardor reports timestamps as chain seconds and amounts as fixed-point
//! integer strings (`priceNQTPerShare`, `quantityQNT`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::amounts::format_nqt;
use crate::config::CARDS_PER_CRAFT;
use crate::time_utils::parse_timestamp_value;
use crate::types::{Burn, Chain, Craft, GiftzSale, Morph, Trade};

/// asset id → display card name
pub type CardCatalog = HashMap<String, String>;

const UNKNOWN_CARD: &str = "Unknown";

/// Build the card catalog from `getAssetsByIssuer` entries. The card name
/// lives in the JSON asset description when the issuer set one.
pub fn card_catalog(assets: &[Value]) -> CardCatalog {
    assets
        .iter()
        .filter_map(|a| {
            let id = str_field(a, "asset")?;
            let from_description = a
                .get("description")
                .and_then(|d| d.as_str())
                .and_then(|d| serde_json::from_str::<Value>(d).ok())
                .and_then(|d| d.get("name").and_then(|n| n.as_str()).map(str::to_string));
            let name = from_description
                .or_else(|| str_field(a, "name"))
                .unwrap_or_else(|| UNKNOWN_CARD.to_string());
            Some((id, name))
        })
        .collect()
}

/// Ardor child chain id → coin ticker.
pub fn chain_currency(chain: i64) -> &'static str {
    match chain {
        1 => "ARDR",
        2 => "IGNIS",
        3 => "AEUR",
        4 => "BITSWIFT",
        5 => "MPG",
        _ => "IGNIS",
    }
}

pub fn normalize_trade(v: &Value, catalog: &CardCatalog) -> Option<Trade> {
    let asset_id = str_field(v, "asset")?;
    let timestamp = parse_timestamp_value(v.get("timestamp")?)?;
    let chain = v.get("chain").and_then(|c| c.as_i64()).unwrap_or(2);

    Some(Trade {
        id: trade_id(v)?,
        timestamp,
        card_name: card_name(v, &asset_id, catalog),
        buyer: account(v, "buyer")?,
        seller: account(v, "seller")?,
        price: format_nqt(v.get("priceNQTPerShare").and_then(|p| p.as_str())),
        currency: chain_currency(chain).to_string(),
        quantity: quantity(v),
        chain: Chain::Ardor,
        asset_id,
    })
}

pub fn normalize_giftz_sale(v: &Value, item_name: &str) -> Option<GiftzSale> {
    Some(GiftzSale {
        id: trade_id(v)?,
        timestamp: parse_timestamp_value(v.get("timestamp")?)?,
        item_name: str_field(v, "name").unwrap_or_else(|| item_name.to_string()),
        buyer: account(v, "buyer")?,
        quantity: quantity(v),
        price: format_nqt(v.get("priceNQTPerShare").and_then(|p| p.as_str())),
    })
}

pub fn normalize_burn(v: &Value, catalog: &CardCatalog) -> Option<Burn> {
    let asset_id = str_field(v, "asset")?;
    Some(Burn {
        id: transfer_id(v)?,
        timestamp: parse_timestamp_value(v.get("timestamp")?)?,
        card_name: card_name(v, &asset_id, catalog),
        sender: account(v, "sender")?,
        quantity: quantity(v),
        asset_id,
    })
}

pub fn normalize_craft(v: &Value, catalog: &CardCatalog) -> Option<Craft> {
    let asset_id = str_field(v, "asset")?;
    Some(Craft {
        id: transfer_id(v)?,
        timestamp: parse_timestamp_value(v.get("timestamp")?)?,
        card_name: card_name(v, &asset_id, catalog),
        recipient: account(v, "recipient")?,
        cards_used: CARDS_PER_CRAFT,
        asset_id,
    })
}

/// A parsed card transfer, the common input of burns, crafts, morphs and users.
#[derive(Debug, Clone)]
pub struct CardTransfer {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub asset_id: String,
    pub card_name: String,
    pub sender: String,
    pub recipient: String,
    pub quantity: u64,
}

pub fn parse_transfer(v: &Value, catalog: &CardCatalog) -> Option<CardTransfer> {
    let asset_id = str_field(v, "asset")?;
    Some(CardTransfer {
        id: transfer_id(v)?,
        timestamp: parse_timestamp_value(v.get("timestamp")?)?,
        card_name: card_name(v, &asset_id, catalog),
        sender: account(v, "sender")?,
        recipient: account(v, "recipient")?,
        quantity: quantity(v),
        asset_id,
    })
}

/// Pair morph inputs (card sent to the morph account) with outputs (card
/// sent back by it). Each output consumes the oldest unconsumed input of the
/// same account at or before its timestamp; outputs with no input keep
/// `from_card = "Unknown"`. Result is newest first.
pub fn pair_morphs(transfers: &[CardTransfer], morph_account: &str) -> Vec<Morph> {
    let mut sorted: Vec<&CardTransfer> = transfers.iter().collect();
    // Inputs sort ahead of outputs sharing their timestamp (same block).
    let is_output = |t: &CardTransfer| t.sender == morph_account;
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| is_output(a).cmp(&is_output(b)))
            .then_with(|| a.id.cmp(&b.id))
    });

    // account → inputs not yet matched, oldest first
    let mut pending: HashMap<&str, Vec<&CardTransfer>> = HashMap::new();
    let mut morphs = Vec::new();

    for t in sorted {
        if t.recipient == morph_account && t.sender != morph_account {
            pending.entry(t.sender.as_str()).or_default().push(t);
        } else if t.sender == morph_account && t.recipient != morph_account {
            let input = pending
                .get_mut(t.recipient.as_str())
                .filter(|q| !q.is_empty())
                .map(|q| q.remove(0));
            morphs.push(Morph {
                id: t.id.clone(),
                timestamp: t.timestamp,
                from_card: input
                    .map(|i| i.card_name.clone())
                    .unwrap_or_else(|| UNKNOWN_CARD.to_string()),
                to_card: t.card_name.clone(),
                morpher: t.recipient.clone(),
                quantity: t.quantity,
            });
        }
    }

    morphs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    morphs
}

fn card_name(v: &Value, asset_id: &str, catalog: &CardCatalog) -> String {
    catalog
        .get(asset_id)
        .cloned()
        .or_else(|| str_field(v, "name"))
        .unwrap_or_else(|| UNKNOWN_CARD.to_string())
}

/// Reed-Solomon address when present, numeric id otherwise.
fn account(v: &Value, field: &str) -> Option<String> {
    str_field(v, &format!("{field}RS")).or_else(|| str_field(v, field))
}

/// Whole units from `quantityQNT` and the asset's `decimals`; 1 when absent.
fn quantity(v: &Value) -> u64 {
    let raw = v
        .get("quantityQNT")
        .and_then(|q| q.as_str().and_then(|s| s.parse::<u64>().ok()).or_else(|| q.as_u64()));
    let decimals = v.get("decimals").and_then(|d| d.as_u64()).unwrap_or(0) as u32;
    match raw {
        Some(qnt) => qnt / 10u64.saturating_pow(decimals),
        None => 1,
    }
}

fn trade_id(v: &Value) -> Option<String> {
    let ask = str_field(v, "askOrderFullHash").or_else(|| str_field(v, "askOrder"))?;
    let bid = str_field(v, "bidOrderFullHash").or_else(|| str_field(v, "bidOrder"))?;
    Some(format!("{ask}:{bid}"))
}

fn transfer_id(v: &Value) -> Option<String> {
    str_field(v, "assetTransferFullHash").or_else(|| str_field(v, "assetTransfer"))
}

/// String field that may arrive as a JSON string or number.
fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
