use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::event::{FeedResponse, Status};
use crate::metrics::Metrics;
use crate::pipeline::Aggregator;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

/// Routes: `/health`, `/api/live-feed`, `/api/search?q=`, plus `/metrics`
/// when a Prometheus handle is given.
pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/api/live-feed", get(live_feed))
        .route("/api/search", get(search))
        .with_state(state);

    let app = match metrics {
        Some(m) => api.merge(m.router()),
        None => api,
    };
    app.layer(CorsLayer::very_permissive())
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    classifier_ready: bool,
    records: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        classifier_ready: state.aggregator.classifier().is_ready(),
        records: state.aggregator.store().len(),
    })
}

async fn live_feed(State(state): State<AppState>) -> Json<FeedResponse> {
    let (resp, _report) = state.aggregator.run_cycle().await;
    Json(resp)
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<FeedResponse>) {
    let resp = state.aggregator.search(&params.q).await;
    let code = match resp.status {
        Status::Success => StatusCode::OK,
        Status::Error => StatusCode::BAD_REQUEST,
    };
    (code, Json(resp))
}
