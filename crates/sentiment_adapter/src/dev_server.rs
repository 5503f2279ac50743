#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sentiment_contracts::sentiment::{SentimentLabelSet, SentimentSnapshot};
use sentiment_engines::sentiment_api::SENTIMENT_API_PATH;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const DEV_SERVER_SEEN_KEYS_MAX: usize = 4096;

/// Most recent idempotency keys, oldest evicted first. A re-delivery older
/// than the window is counted again.
#[derive(Debug, Default)]
struct SeenKeys {
    capacity: usize,
    order: VecDeque<String>,
    keys: BTreeSet<String>,
}

impl SeenKeys {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ..Self::default()
        }
    }

    /// `false` when the key is still inside the window.
    fn insert(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.keys.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.to_string());
        self.keys.insert(key.to_string());
        true
    }
}

/// In-memory counts behind the sentiment API, for local runs and tests.
///
/// Idempotency keys are remembered for the last `DEV_SERVER_SEEN_KEYS_MAX`
/// deliveries only.
#[derive(Debug, Clone)]
pub struct DevServerState {
    labels: Arc<SentimentLabelSet>,
    counts: Arc<Mutex<BTreeMap<String, u64>>>,
    seen_keys: Arc<Mutex<SeenKeys>>,
}

impl DevServerState {
    pub fn new(labels: SentimentLabelSet) -> Self {
        Self::with_seen_key_capacity(labels, DEV_SERVER_SEEN_KEYS_MAX)
    }

    pub fn with_seen_key_capacity(labels: SentimentLabelSet, capacity: usize) -> Self {
        let counts = labels
            .labels()
            .iter()
            .map(|label| (label.as_str().to_string(), 0))
            .collect();
        Self {
            labels: Arc::new(labels),
            counts: Arc::new(Mutex::new(counts)),
            seen_keys: Arc::new(Mutex::new(SeenKeys::with_capacity(capacity))),
        }
    }

    pub fn snapshot(&self) -> Result<SentimentSnapshot, String> {
        let counts = self
            .counts
            .lock()
            .map_err(|_| "dev server counts lock poisoned".to_string())?
            .clone();
        SentimentSnapshot::v1(counts).map_err(|err| err.to_string())
    }

    /// Returns `false` when `idempotency_key` was already counted.
    fn record(&self, label: &str, idempotency_key: Option<&str>) -> Result<bool, String> {
        if let Some(key) = idempotency_key {
            let mut seen = self
                .seen_keys
                .lock()
                .map_err(|_| "dev server key lock poisoned".to_string())?;
            if !seen.insert(key) {
                return Ok(false);
            }
        }
        let mut counts = self
            .counts
            .lock()
            .map_err(|_| "dev server counts lock poisoned".to_string())?;
        let count = counts.entry(label.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    sentiment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: String,
    pub reason: Option<String>,
}

impl SubmitResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            reason: None,
        }
    }

    fn error(reason: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            reason: Some(reason.into()),
        }
    }
}

pub fn dev_server_router(state: DevServerState) -> Router {
    Router::new()
        .route(SENTIMENT_API_PATH, get(fetch_counts).post(submit_sentiment))
        .with_state(state)
}

pub async fn serve_dev_server(listener: TcpListener, state: DevServerState) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "sentiment dev server listening");
    axum::serve(listener, dev_server_router(state)).await
}

async fn fetch_counts(
    State(state): State<DevServerState>,
) -> Result<Json<SentimentSnapshot>, (StatusCode, String)> {
    state
        .snapshot()
        .map(Json)
        .map_err(|reason| (StatusCode::INTERNAL_SERVER_ERROR, reason))
}

async fn submit_sentiment(
    State(state): State<DevServerState>,
    headers: HeaderMap,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> (StatusCode, Json<SubmitResponse>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "malformed sentiment body");
            return (
                StatusCode::BAD_REQUEST,
                Json(SubmitResponse::error(rejection.body_text())),
            );
        }
    };
    let label = match state.labels.resolve(request.sentiment.as_deref()) {
        Ok(label) => label,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SubmitResponse::error(err.to_string())),
            )
        }
    };
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    match state.record(label.as_str(), key) {
        Ok(counted) => {
            if !counted {
                debug!(sentiment = label.as_str(), "duplicate delivery ignored");
            }
            (StatusCode::CREATED, Json(SubmitResponse::ok()))
        }
        Err(reason) => {
            warn!(%reason, "dev server could not record sentiment");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SubmitResponse::error(reason)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_dev_server_01_counts_start_at_zero_for_every_label() {
        let state = DevServerState::new(SentimentLabelSet::mvp_v1());
        let snapshot = state.snapshot().unwrap();
        assert_eq!(snapshot.counts().len(), 3);
        assert_eq!(snapshot.total(), 0);
    }

    #[test]
    fn at_dev_server_02_repeated_key_counts_once() {
        let state = DevServerState::new(SentimentLabelSet::mvp_v1());
        assert!(state.record("negative", Some("k1")).unwrap());
        assert!(!state.record("negative", Some("k1")).unwrap());
        assert!(state.record("negative", None).unwrap());
        assert!(state.record("negative", None).unwrap());
        assert_eq!(state.snapshot().unwrap().count_for("negative"), 3);
    }

    #[test]
    fn at_dev_server_03_key_window_is_bounded() {
        let state = DevServerState::with_seen_key_capacity(SentimentLabelSet::mvp_v1(), 2);
        assert!(state.record("positive", Some("a")).unwrap());
        assert!(state.record("positive", Some("b")).unwrap());
        assert!(!state.record("positive", Some("b")).unwrap());
        assert!(state.record("positive", Some("c")).unwrap());
        // "a" fell out of the window.
        assert!(state.record("positive", Some("a")).unwrap());
        assert!(!state.record("positive", Some("c")).unwrap());
        assert_eq!(state.seen_keys.lock().unwrap().order.len(), 2);
        assert_eq!(state.snapshot().unwrap().count_for("positive"), 4);
    }
}
