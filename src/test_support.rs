//! In-process fake upstream used by tests: a real HTTP server on 127.0.0.1
//! whose responses come from a closure. Counts every request it serves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct FakeRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

impl FakeRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct FakeResponse {
    pub status: u16,
    pub body: Value,
    pub delay: Option<Duration>,
}

impl FakeResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body, delay: None }
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self { status, body, delay: None }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Responder = Arc<dyn Fn(&FakeRequest) -> FakeResponse + Send + Sync>;

#[derive(Clone)]
struct FakeState {
    responder: Responder,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<FakeRequest>>>,
}

pub struct FakeUpstream {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<FakeRequest>>>,
}

impl FakeUpstream {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&FakeRequest) -> FakeResponse + Send + Sync + 'static,
    {
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            responder: Arc::new(responder),
            hits: Arc::clone(&hits),
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(handle).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            hits,
            requests,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Requests whose `requestType` (Ardor) or path suffix (indexing API) matches `name`.
    pub fn hits_for(&self, name: &str) -> usize {
        self.requests
            .lock()
            .map(|reqs| {
                reqs.iter()
                    .filter(|r| r.param("requestType") == Some(name) || r.path.ends_with(name))
                    .count()
            })
            .unwrap_or(0)
    }
}

async fn handle(
    State(state): State<FakeState>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let req = FakeRequest {
        path: uri.path().to_string(),
        query,
        body: serde_json::from_slice(&body).ok(),
    };
    if let Ok(mut reqs) = state.requests.lock() {
        reqs.push(req.clone());
    }

    let resp = (state.responder)(&req);
    if let Some(delay) = resp.delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(resp.body))
}
