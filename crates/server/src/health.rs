use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use billbot_store::QuoteCache;

#[derive(Clone)]
pub struct HealthState {
    cache: Arc<QuoteCache>,
}

impl HealthState {
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self { cache }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub quotes_cached: usize,
    pub last_refreshed_secs_ago: Option<u64>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Ready once the cache has completed at least one refresh.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let last_refreshed = state.cache.last_refreshed().await;
    let ready = last_refreshed.is_some();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        quotes_cached: state.cache.len().await,
        last_refreshed_secs_ago: last_refreshed.map(|at| at.elapsed().as_secs()),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
