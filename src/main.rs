//! Crisis Feed Aggregator: binary entrypoint.
//! Boots the Axum HTTP server: config, tracing, metrics, classifier warm-up,
//! snapshot restore and the retention sweep.

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::ShuttleAxum;

use crisis_feed::classify::{ClassifierGateway, OverrideRules};
use crisis_feed::metrics::Metrics;
use crisis_feed::scheduler::{spawn_eviction_sweep, SweepCfg};
use crisis_feed::{telemetry, warm_up_classifier, AggregatorConfig, Aggregator, AppState, EventStore};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    telemetry::init();

    let cfg = AggregatorConfig::load_default()?;
    tracing::info!(
        sources = cfg.sources.len(),
        provider = ?cfg.classifier.provider,
        "config loaded"
    );

    let metrics = match Metrics::init(&cfg.pipeline) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics disabled");
            None
        }
    };

    let store = Arc::new(EventStore::new());
    if let Some(path) = cfg.pipeline.snapshot_path.as_deref().filter(|p| p.exists()) {
        match store.load_snapshot(path) {
            Ok(n) => tracing::info!(records = n, path = %path.display(), "snapshot restored"),
            Err(e) => tracing::warn!(error = ?e, "snapshot restore failed; starting empty"),
        }
    }

    let overrides = if cfg.classifier.overrides.is_empty() {
        OverrideRules::default()
    } else {
        OverrideRules::from_rules(&cfg.classifier.overrides)
    };
    let gateway = Arc::new(ClassifierGateway::new(overrides));
    tokio::spawn(warm_up_classifier(
        Arc::clone(&gateway),
        cfg.classifier.clone(),
    ));

    spawn_eviction_sweep(
        Arc::clone(&store),
        SweepCfg {
            interval: Duration::from_secs(cfg.pipeline.sweep_interval_secs),
            retention_secs: cfg.pipeline.retention_secs,
            snapshot_path: cfg.pipeline.snapshot_path.clone(),
        },
    );

    let aggregator = Arc::new(Aggregator::from_config(&cfg, store, gateway)?);
    let router = crisis_feed::router(AppState { aggregator }, metrics.as_ref());

    Ok(router.into())
}
