// tests/api_http.rs

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use crisis_feed::classify::{Category, ClassifierGateway, FixedModel, OverrideRules};
use crisis_feed::config::{PipelineSettings, SourceClass, SourceConfig};
use crisis_feed::ingest::rss::RssAdapter;
use crisis_feed::ingest::DynAdapter;
use crisis_feed::metrics::Metrics;
use crisis_feed::{router, Aggregator, AppState, EventStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`

const GDACS_XML: &str = include_str!("fixtures/gdacs_rss.xml");

fn app(with_model: bool) -> axum::Router {
    let adapters: Vec<DynAdapter> = vec![Arc::new(RssAdapter::from_fixture(
        SourceConfig::new("GDACS", 90, SourceClass::Curated, "https://gdacs.test/rss"),
        GDACS_XML,
    ))];
    let gateway = if with_model {
        ClassifierGateway::with_model(
            Arc::new(FixedModel::new(Category::Other, 0.5)),
            OverrideRules::default(),
        )
    } else {
        ClassifierGateway::default()
    };
    let aggregator = Aggregator::new(
        adapters,
        Arc::new(EventStore::new()),
        Arc::new(gateway),
        PipelineSettings::default(),
    );
    // Detached recorder: renders without becoming the global one.
    let metrics = Metrics {
        handle: PrometheusBuilder::new().build_recorder().handle(),
    };
    router(
        AppState {
            aggregator: Arc::new(aggregator),
        },
        Some(&metrics),
    )
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request");
    let resp = app.oneshot(req).await.expect("request failed");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_readiness() {
    let (code, body) = get_json(app(false), "/health").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["classifier_ready"], false);

    let (_, body) = get_json(app(true), "/health").await;
    assert_eq!(body["classifier_ready"], true);
}

#[tokio::test]
async fn live_feed_returns_camel_case_events() {
    let (code, body) = get_json(app(true), "/api/live-feed").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["category"], "Earthquake");
    assert_eq!(data[0]["sourceName"], "GDACS");
    assert!(data[0]["confidence"].as_u64().unwrap() <= 100);
    assert!(data[0].get("source_name").is_none());
}

#[tokio::test]
async fn live_feed_while_loading_is_empty_success() {
    let (code, body) = get_json(app(false), "/api/live-feed").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_finds_and_tiers() {
    let (code, body) = get_json(app(true), "/api/search?q=earthquake").await;
    assert_eq!(code, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["confidence"], 90);
}

#[tokio::test]
async fn empty_search_is_a_bad_request() {
    for uri in ["/api/search", "/api/search?q=", "/api/search?q=%20%20"] {
        let (code, body) = get_json(app(true), uri).await;
        assert_eq!(code, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["status"], "error");
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn metrics_route_is_mounted() {
    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = app(true).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
