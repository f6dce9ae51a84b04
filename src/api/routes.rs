use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::latency::LatencyStats;
use crate::error::AppError;
use crate::services::AggregationService;
use crate::time_utils::date_to_chain_timestamp;
use crate::types::{Aggregated, AllData, Chain, Period};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<AggregationService>,
    pub latency: Arc<LatencyStats>,
    pub started: Instant,
}

pub fn router(state: ApiState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/trades", get(get_trades))
        .route("/api/burns", get(get_burns))
        .route("/api/crafts", get(get_crafts))
        .route("/api/morphs", get(get_morphs))
        .route("/api/giftz", get(get_giftz))
        .route("/api/users", get(get_users))
        .route("/api/all", get(get_all))
        .route("/api/cache/status", get(get_cache_status))
        .route("/api/cache/clear", post(clear_cache))
        .route("/api/cache/:key", delete(delete_cache_entry))
        .route("/api/health", get(get_health))
        .route("/api/stats/latency", get(get_stats_latency))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {o:?}");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

// ---------------------------------------------------------------------------
// Query params
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    pub period: Option<String>,
    pub refresh: Option<String>,
    pub force: Option<String>,
}

impl DataQuery {
    fn period(&self) -> Period {
        Period::parse_lossy(self.period.as_deref())
    }

    /// `refresh=true` and `force=true` are synonyms.
    fn force(&self) -> bool {
        let truthy = |v: &Option<String>| {
            v.as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("true") || s == "1")
        };
        truthy(&self.refresh) || truthy(&self.force)
    }
}

// ---------------------------------------------------------------------------
// Response shaping
// ---------------------------------------------------------------------------

/// `{ <key>: [...], count, status, error?, timestamp }`, the wire shape the
/// dashboard expects for every dataset.
fn envelope<T: Serialize>(key: &str, agg: &Aggregated<T>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(key.to_string(), json!(agg.records));
    body.insert("count".to_string(), json!(agg.count));
    body.insert("status".to_string(), json!(agg.status));
    if let Some(err) = &agg.error {
        body.insert("error".to_string(), json!(err));
    }
    body.insert("timestamp".to_string(), json!(agg.timestamp));
    body
}

fn morphs_body(agg: &Aggregated<crate::types::Morph>) -> Map<String, Value> {
    let total: u64 = agg.records.iter().map(|m| m.quantity).sum();
    let mut body = envelope("morphs", agg);
    body.insert("totalQuantity".to_string(), json!(total));
    body
}

/// Users are cached as one list and split per chain on the way out.
fn users_body(agg: &Aggregated<crate::types::ActiveUser>) -> Map<String, Value> {
    let (ardor, polygon): (Vec<_>, Vec<_>) = agg.records.iter().partition(|u| u.chain == Chain::Ardor);
    let mut body = envelope("users", agg);
    body.remove("users");
    body.insert("ardor_users".to_string(), json!(ardor));
    body.insert("polygon_users".to_string(), json!(polygon));
    body
}

fn all_body(all: &AllData) -> Value {
    json!({
        "trades": envelope("trades", &all.trades),
        "burns": envelope("burns", &all.burns),
        "crafts": envelope("craftings", &all.crafts),
        "morphs": morphs_body(&all.morphs),
        "giftz": envelope("sales", &all.giftz_sales),
        "users": users_body(&all.users),
        "timestamp": all.timestamp,
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub warming: bool,
    pub fetches_ok: u64,
    pub fetches_failed: u64,
    pub cache_hits: u64,
    pub last_fetch_ok_ms: Option<u64>,
    pub last_fetch_err_ms: Option<u64>,
    /// Current time as an Ardor chain timestamp, comparable with a node's `getTime`.
    pub chain_time: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_trades(State(state): State<ApiState>, Query(q): Query<DataQuery>) -> Json<Map<String, Value>> {
    let agg = state.service.get_trades(q.period(), q.force()).await;
    Json(envelope("trades", &agg))
}

async fn get_burns(State(state): State<ApiState>, Query(q): Query<DataQuery>) -> Json<Map<String, Value>> {
    let agg = state.service.get_burns(q.period(), q.force()).await;
    Json(envelope("burns", &agg))
}

async fn get_crafts(State(state): State<ApiState>, Query(q): Query<DataQuery>) -> Json<Map<String, Value>> {
    let agg = state.service.get_crafts(q.period(), q.force()).await;
    Json(envelope("craftings", &agg))
}

async fn get_morphs(State(state): State<ApiState>, Query(q): Query<DataQuery>) -> Json<Map<String, Value>> {
    let agg = state.service.get_morphs(q.period(), q.force()).await;
    Json(morphs_body(&agg))
}

async fn get_giftz(State(state): State<ApiState>, Query(q): Query<DataQuery>) -> Json<Map<String, Value>> {
    let agg = state.service.get_giftz_sales(q.period(), q.force()).await;
    Json(envelope("sales", &agg))
}

async fn get_users(State(state): State<ApiState>, Query(q): Query<DataQuery>) -> Json<Map<String, Value>> {
    let agg = state.service.get_users(q.period(), q.force()).await;
    Json(users_body(&agg))
}

async fn get_all(State(state): State<ApiState>, Query(q): Query<DataQuery>) -> Json<Value> {
    let all = state.service.get_all_data(q.period(), q.force()).await;
    Json(all_body(&all))
}

async fn get_cache_status(State(state): State<ApiState>) -> Result<Json<Value>, AppError> {
    let files = state.service.cache_status().await?;
    Ok(Json(json!({ "count": files.len(), "files": files })))
}

async fn delete_cache_entry(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = state.service.clear_cache(&key).await?;
    Ok(Json(json!({ "deleted": deleted, "key": key })))
}

async fn clear_cache(State(state): State<ApiState>) -> Result<Json<Value>, AppError> {
    let cleared = state.service.clear_all().await?;
    Ok(Json(json!({ "cleared": cleared })))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let h = state.service.health();
    let nonzero = |v: u64| (v > 0).then_some(v);
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started.elapsed().as_secs(),
        warming: h.warming(),
        fetches_ok: h.fetches_ok(),
        fetches_failed: h.fetches_failed(),
        cache_hits: h.cache_hits(),
        last_fetch_ok_ms: nonzero(h.last_fetch_ok_ms()),
        last_fetch_err_ms: nonzero(h.last_fetch_err_ms()),
        chain_time: date_to_chain_timestamp(Utc::now()),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<Value> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(json!({
        "samples": state.latency.len(),
        "p50_ms": p50,
        "p95_ms": p95,
        "p99_ms": p99,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::health::HealthState;
    use crate::cache::FileCache;
    use crate::config::Config;
    use crate::test_support::{FakeResponse, FakeUpstream};
    use crate::types::{ActiveUser, Burn, CacheEntry, Morph};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        upstream: FakeUpstream,
        cache: FileCache,
        _dir: TempDir,
    }

    /// Router over a dead upstream (every call fails) so only cached data can appear.
    async fn harness(origins: &[&str]) -> Harness {
        let upstream = FakeUpstream::start(|_| FakeResponse::status(502, json!({ "error": "bad gateway" }))).await;
        let dir = TempDir::new().unwrap();
        let cfg = Config::for_tests(&upstream.base_url, dir.path().to_str().unwrap());
        let latency = Arc::new(LatencyStats::new());
        let service = AggregationService::new(cfg, Arc::new(HealthState::new()), Arc::clone(&latency)).unwrap();
        let state = ApiState {
            service: Arc::new(service),
            latency,
            started: Instant::now(),
        };
        let origins: Vec<String> = origins.iter().map(|s| s.to_string()).collect();
        Harness {
            app: router(state, &origins),
            upstream,
            cache: FileCache::new(dir.path()),
            _dir: dir,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn burn(id: usize, hours_ago: i64) -> Burn {
        Burn {
            id: format!("burn-{id}"),
            timestamp: Utc::now() - Duration::hours(hours_ago),
            card_name: "Kraken".to_string(),
            asset_id: "101".to_string(),
            sender: "ARDOR-PLAYER".to_string(),
            quantity: 1,
        }
    }

    #[tokio::test]
    async fn burns_24h_returns_only_recent_cached_records() {
        let h = harness(&["*"]).await;
        let burns: Vec<Burn> = (0..10).map(|i| burn(i, if i < 3 { 2 } else { 72 })).collect();
        h.cache.write_entry("burns", &CacheEntry::new(burns)).await.unwrap();

        let (status, body) = send(&h.app, "GET", "/api/burns?period=24h").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["burns"].as_array().unwrap().len(), 3);
        assert_eq!(body["status"], "cached");
        assert_eq!(h.upstream.hits(), 0);
    }

    #[tokio::test]
    async fn unknown_period_falls_back_to_30d() {
        let h = harness(&["*"]).await;
        let burns = vec![burn(0, 24 * 10), burn(1, 24 * 45)];
        h.cache.write_entry("burns", &CacheEntry::new(burns)).await.unwrap();

        let (_, body) = send(&h.app, "GET", "/api/burns?period=quarter").await;
        assert_eq!(body["count"], 1);
        let (_, body) = send(&h.app, "GET", "/api/burns").await;
        assert_eq!(body["count"], 1);
        let (_, body) = send(&h.app, "GET", "/api/burns?period=all").await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn failed_upstream_gives_empty_well_formed_body() {
        let h = harness(&["*"]).await;
        let (status, body) = send(&h.app, "GET", "/api/trades").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trades"], json!([]));
        assert_eq!(body["count"], 0);
        assert_eq!(body["status"], "error");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn force_flag_bypasses_cache() {
        let h = harness(&["*"]).await;
        h.cache.write_entry("burns", &CacheEntry::new(vec![burn(0, 1)])).await.unwrap();

        let (_, body) = send(&h.app, "GET", "/api/burns?force=true").await;
        assert_eq!(body["status"], "stale");
        assert_eq!(body["count"], 1);
        assert!(h.upstream.hits() > 0);

        let before = h.upstream.hits();
        let (_, body) = send(&h.app, "GET", "/api/burns?refresh=false").await;
        assert_eq!(body["status"], "cached");
        assert_eq!(h.upstream.hits(), before);
    }

    #[tokio::test]
    async fn compatibility_keys_per_dataset() {
        let h = harness(&["*"]).await;
        let morphs = vec![
            Morph {
                id: "m1".to_string(),
                timestamp: Utc::now(),
                from_card: "Kraken".to_string(),
                to_card: "Hydra".to_string(),
                morpher: "ARDOR-A".to_string(),
                quantity: 2,
            },
            Morph {
                id: "m2".to_string(),
                timestamp: Utc::now(),
                from_card: "Unknown".to_string(),
                to_card: "Hydra".to_string(),
                morpher: "ARDOR-B".to_string(),
                quantity: 3,
            },
        ];
        h.cache.write_entry("morphs", &CacheEntry::new(morphs)).await.unwrap();
        let user = |addr: &str, chain| ActiveUser {
            address: addr.to_string(),
            chain,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            trades: 1,
            mints: 0,
            purchases: 0,
            transfers: 0,
        };
        h.cache
            .write_entry("users", &CacheEntry::new(vec![user("ARDOR-A", Chain::Ardor), user("0xabc", Chain::Polygon)]))
            .await
            .unwrap();

        let (_, body) = send(&h.app, "GET", "/api/morphs").await;
        assert_eq!(body["totalQuantity"], 5);
        assert_eq!(body["morphs"][0]["fromCard"], "Kraken");

        let (_, body) = send(&h.app, "GET", "/api/users").await;
        assert_eq!(body["ardor_users"].as_array().unwrap().len(), 1);
        assert_eq!(body["polygon_users"][0]["address"], "0xabc");
        assert_eq!(body["count"], 2);
        assert!(body.get("users").is_none());

        let (_, body) = send(&h.app, "GET", "/api/crafts").await;
        assert!(body["craftings"].is_array());
        let (_, body) = send(&h.app, "GET", "/api/giftz").await;
        assert!(body["sales"].is_array());
    }

    #[tokio::test]
    async fn all_groups_every_dataset() {
        let h = harness(&["*"]).await;
        h.cache.write_entry("burns", &CacheEntry::new(vec![burn(0, 1)])).await.unwrap();

        let (status, body) = send(&h.app, "GET", "/api/all?period=7d").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["burns"]["count"], 1);
        assert_eq!(body["burns"]["status"], "cached");
        assert_eq!(body["trades"]["status"], "error");
        assert!(body["crafts"]["craftings"].is_array());
        assert!(body["giftz"]["sales"].is_array());
        assert!(body["users"]["ardor_users"].is_array());
        assert!(body["morphs"]["totalQuantity"].is_number());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn cache_admin_endpoints() {
        let h = harness(&["*"]).await;
        h.cache.write_entry("burns", &CacheEntry::new(vec![burn(0, 1), burn(1, 5)])).await.unwrap();
        h.cache.write_entry("crafts", &CacheEntry::<Burn>::new(Vec::new())).await.unwrap();

        let (_, body) = send(&h.app, "GET", "/api/cache/status").await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["files"][0]["name"], "burns");
        assert_eq!(body["files"][0]["count"], 2);

        let (status, body) = send(&h.app, "DELETE", "/api/cache/burns").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "deleted": true, "key": "burns" }));

        let (status, body) = send(&h.app, "DELETE", "/api/cache/bad.key").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("bad.key"));

        let (_, body) = send(&h.app, "POST", "/api/cache/clear").await;
        assert_eq!(body["cleared"], 1);
    }

    #[tokio::test]
    async fn health_and_latency() {
        let h = harness(&["*"]).await;
        send(&h.app, "GET", "/api/trades").await;

        let (_, body) = send(&h.app, "GET", "/api/health").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["fetches_failed"], 1);
        assert!(body["last_fetch_err_ms"].is_number());
        assert!(body["last_fetch_ok_ms"].is_null());
        // chain time counts seconds since 2018-01-01, so it is well past 2023 by now
        assert!(body["chain_time"].as_i64().unwrap() > 157_766_400);

        let (_, body) = send(&h.app, "GET", "/api/stats/latency").await;
        assert!(body["samples"].as_u64().unwrap() >= 3);
        assert!(body["p50_ms"].is_number());
    }

    #[tokio::test]
    async fn cors_allow_list() {
        let h = harness(&["https://dash.example"]).await;
        let resp = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header(header::ORIGIN, "https://dash.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://dash.example"
        );

        let resp = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header(header::ORIGIN, "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
