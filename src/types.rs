use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// Relative time window selected by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "all")]
    All,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Day, Period::Week, Period::Month, Period::All];

    /// Parse a period token. Unknown or missing tokens fall back to `30d`.
    pub fn parse_lossy(token: Option<&str>) -> Self {
        token
            .and_then(|t| t.parse().ok())
            .unwrap_or(Period::Month)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
            Period::All => "all",
        }
    }

    /// Window length, `None` for `all`.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match self {
            Period::Day => Some(chrono::Duration::hours(24)),
            Period::Week => Some(chrono::Duration::days(7)),
            Period::Month => Some(chrono::Duration::days(30)),
            Period::All => None,
        }
    }
}

impl Default for Period {
    fn default() -> Self {
        Period::Month
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "24h" => Ok(Period::Day),
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "all" => Ok(Period::All),
            other => Err(format!("unknown period '{other}'")),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Chain / Dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ardor,
    Polygon,
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Chain::Ardor => "ardor",
            Chain::Polygon => "polygon",
        };
        write!(f, "{s}")
    }
}

/// Logical dataset name. Doubles as the cache file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Trades,
    Burns,
    Crafts,
    Morphs,
    GiftzSales,
    Users,
}

impl Dataset {
    pub const ALL: [Dataset; 6] = [
        Dataset::Trades,
        Dataset::Burns,
        Dataset::Crafts,
        Dataset::Morphs,
        Dataset::GiftzSales,
        Dataset::Users,
    ];

    pub fn cache_name(&self) -> &'static str {
        match self {
            Dataset::Trades => "trades",
            Dataset::Burns => "burns",
            Dataset::Crafts => "crafts",
            Dataset::Morphs => "morphs",
            Dataset::GiftzSales => "giftz_sales",
            Dataset::Users => "users",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cache_name())
    }
}

// ---------------------------------------------------------------------------
// Normalized records
// ---------------------------------------------------------------------------

/// A normalized record that belongs to one dataset and sits at one instant.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const DATASET: Dataset;

    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub card_name: String,
    pub asset_id: String,
    pub buyer: String,
    pub seller: String,
    /// Display price in whole currency units.
    pub price: String,
    pub currency: String,
    pub quantity: u64,
    pub chain: Chain,
}

impl Record for Trade {
    const DATASET: Dataset = Dataset::Trades;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Burn {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub card_name: String,
    pub asset_id: String,
    pub sender: String,
    pub quantity: u64,
}

impl Record for Burn {
    const DATASET: Dataset = Dataset::Burns;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Craft {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub card_name: String,
    pub recipient: String,
    pub cards_used: u32,
    pub asset_id: String,
}

impl Record for Craft {
    const DATASET: Dataset = Dataset::Crafts;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Morph {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub from_card: String,
    pub to_card: String,
    pub morpher: String,
    pub quantity: u64,
}

impl Record for Morph {
    const DATASET: Dataset = Dataset::Morphs;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftzSale {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub item_name: String,
    pub buyer: String,
    pub quantity: u64,
    pub price: String,
}

impl Record for GiftzSale {
    const DATASET: Dataset = Dataset::GiftzSales;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Derived from scanning trades and transfers; not a first-class chain entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub address: String,
    pub chain: Chain,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub trades: u64,
    pub mints: u64,
    pub purchases: u64,
    pub transfers: u64,
}

impl Record for ActiveUser {
    const DATASET: Dataset = Dataset::Users;
    /// A user falls inside a period when their latest activity does.
    fn timestamp(&self) -> DateTime<Utc> {
        self.last_seen
    }
}

// ---------------------------------------------------------------------------
// Cache + aggregation envelopes
// ---------------------------------------------------------------------------

/// On-disk shape of one dataset: whole array plus metadata, replaced atomically per write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: Vec<T>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: Vec<T>) -> Self {
        let count = data.len();
        Self {
            data,
            count,
            timestamp: Utc::now(),
        }
    }
}

/// Where the records of an aggregation result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
    /// Fetched from upstream during this call.
    Fresh,
    /// Served from the file cache without a network call.
    Cached,
    /// Upstream failed; last cached copy served instead.
    Stale,
    /// Upstream failed and nothing was cached.
    Error,
}

impl std::fmt::Display for DataStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataStatus::Fresh => "fresh",
            DataStatus::Cached => "cached",
            DataStatus::Stale => "stale",
            DataStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Aggregated<T> {
    pub records: Vec<T>,
    /// Always `records.len()`.
    pub count: usize,
    pub status: DataStatus,
    pub error: Option<String>,
    /// When the underlying data was fetched.
    pub timestamp: DateTime<Utc>,
}

impl<T> Aggregated<T> {
    pub fn new(records: Vec<T>, status: DataStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            count: records.len(),
            records,
            status,
            error: None,
            timestamp,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            records: Vec::new(),
            count: 0,
            status: DataStatus::Error,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllData {
    pub trades: Aggregated<Trade>,
    pub burns: Aggregated<Burn>,
    pub crafts: Aggregated<Craft>,
    pub morphs: Aggregated<Morph>,
    pub giftz_sales: Aggregated<GiftzSale>,
    pub users: Aggregated<ActiveUser>,
    pub timestamp: DateTime<Utc>,
}
