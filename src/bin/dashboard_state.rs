//! Dashboard data manager: polls the monitor's REST API and keeps the last
//! good snapshot in an explicit state container the renderer reads from.

use std::time::Instant;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror the monitor's /api/all shape)
// ---------------------------------------------------------------------------

/// One dataset block. Each endpoint names its record array differently.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
#[allow(dead_code)]
pub struct DatasetBlock<T> {
    #[serde(alias = "trades", alias = "burns", alias = "craftings", alias = "morphs", alias = "sales", default)]
    pub records: Vec<T>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub status: String,
    pub error: Option<String>,
    #[serde(rename = "totalQuantity")]
    pub total_quantity: Option<u64>,
}

impl<T> Default for DatasetBlock<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            count: 0,
            status: String::new(),
            error: None,
            total_quantity: None,
        }
    }
}

impl<T> DatasetBlock<T> {
    pub fn degraded(&self) -> bool {
        matches!(self.status.as_str(), "stale" | "error")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(dead_code)]
pub struct UsersBlock {
    #[serde(default)]
    pub ardor_users: Vec<UserRow>,
    #[serde(default)]
    pub polygon_users: Vec<UserRow>,
    #[serde(default)]
    pub status: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRow {
    pub timestamp: String,
    pub card_name: String,
    pub buyer: String,
    pub seller: String,
    pub price: String,
    pub currency: String,
    pub quantity: u64,
    pub chain: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRow {
    pub timestamp: String,
    pub card_name: String,
    pub sender: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CraftRow {
    pub timestamp: String,
    pub card_name: String,
    pub recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphRow {
    pub timestamp: String,
    pub from_card: String,
    pub to_card: String,
    pub morpher: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct SaleRow {
    pub timestamp: String,
    pub item_name: String,
    pub buyer: String,
    pub quantity: u64,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct UserRow {
    pub address: String,
    pub last_seen: String,
    pub trades: u64,
}

/// `GET /api/all`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub trades: DatasetBlock<TradeRow>,
    #[serde(default)]
    pub burns: DatasetBlock<BurnRow>,
    #[serde(default)]
    pub crafts: DatasetBlock<CraftRow>,
    #[serde(default)]
    pub morphs: DatasetBlock<MorphRow>,
    #[serde(default)]
    pub giftz: DatasetBlock<SaleRow>,
    #[serde(default)]
    pub users: UsersBlock,
}

// ---------------------------------------------------------------------------
// Period selector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Day,
    Week,
    #[default]
    Month,
    All,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
            Period::All => "all",
        }
    }

    /// Unknown tokens select the default window, as the API does.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "24h" => Period::Day,
            "7d" => Period::Week,
            "all" => Period::All,
            _ => Period::Month,
        }
    }
}

// ---------------------------------------------------------------------------
// State container
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub trades: usize,
    pub burns: usize,
    pub crafts: usize,
    pub morphs: usize,
    pub morphed_cards: u64,
    pub giftz_sales: usize,
    pub ardor_users: usize,
    pub polygon_users: usize,
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub status: ConnectionStatus,
    pub snapshot: Snapshot,
    pub last_refresh: Option<Instant>,
    pub base_url: String,
    period: Period,
    refreshing: bool,
}

impl DashboardState {
    pub fn new(base_url: String, period: Period) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            snapshot: Snapshot::default(),
            last_refresh: None,
            base_url,
            period,
            refreshing: false,
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Returns whether the period actually changed.
    pub fn set_period(&mut self, period: Period) -> bool {
        let changed = self.period != period;
        self.period = period;
        changed
    }

    /// Claim the refresh slot. `false` means a poll is already in flight.
    pub fn begin_refresh(&mut self) -> bool {
        if self.refreshing {
            return false;
        }
        self.refreshing = true;
        true
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;
        self.status = ConnectionStatus::Connected;
        self.last_refresh = Some(Instant::now());
        self.refreshing = false;
    }

    /// Keeps the previous snapshot on screen.
    pub fn record_error(&mut self, message: String) {
        self.status = ConnectionStatus::Error(message);
        self.refreshing = false;
    }

    pub fn counters(&self) -> Counters {
        let s = &self.snapshot;
        Counters {
            trades: s.trades.count,
            burns: s.burns.count,
            crafts: s.crafts.count,
            morphs: s.morphs.count,
            morphed_cards: s
                .morphs
                .total_quantity
                .unwrap_or_else(|| s.morphs.records.iter().map(|m| m.quantity).sum()),
            giftz_sales: s.giftz.count,
            ardor_users: s.users.ardor_users.len(),
            polygon_users: s.users.polygon_users.len(),
        }
    }

    /// Dataset names whose last fetch fell back to stale data or failed.
    pub fn degraded(&self) -> Vec<&'static str> {
        let s = &self.snapshot;
        let mut out = Vec::new();
        if s.trades.degraded() {
            out.push("trades");
        }
        if s.burns.degraded() {
            out.push("burns");
        }
        if s.crafts.degraded() {
            out.push("crafts");
        }
        if s.morphs.degraded() {
            out.push("morphs");
        }
        if s.giftz.degraded() {
            out.push("giftz");
        }
        if matches!(s.users.status.as_str(), "stale" | "error") {
            out.push("users");
        }
        out
    }
}

/// One poll of `/api/all` for `period`.
pub async fn fetch_snapshot(client: &reqwest::Client, base_url: &str, period: Period) -> Result<Snapshot, String> {
    let url = format!("{}/api/all?period={}", base_url.trim_end_matches('/'), period.as_str());
    let resp = client.get(&url).send().await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status()));
    }
    resp.json::<Snapshot>()
        .await
        .map_err(|e| format!("parse error: {e}"))
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// `2024-03-01T12:34:56Z` → `03-01 12:34`.
pub fn format_time(rfc3339: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(rfc3339) {
        Ok(d) => d.format("%m-%d %H:%M").to_string(),
        Err(_) => truncate(rfc3339, 11),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
