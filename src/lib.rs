// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod classify;
pub mod config;
pub mod consensus;
pub mod event;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::classify::{Category, ClassifierGateway, Verdict};
pub use crate::config::AggregatorConfig;
pub use crate::event::{EventRecord, EventView, FeedResponse, Status};
pub use crate::pipeline::{Aggregator, CycleReport};
pub use crate::store::EventStore;

use std::sync::Arc;
use std::time::Duration;

use crate::classify::build_model;
use crate::config::ClassifierSettings;

/// Build the configured model off the request path and install it into the
/// gateway. Until then every classification reports `Loading`. Failures are
/// logged; the gateway simply stays unready.
pub async fn warm_up_classifier(gateway: Arc<ClassifierGateway>, settings: ClassifierSettings) {
    let model = match build_model(&settings) {
        Ok(Some(m)) => m,
        Ok(None) => {
            tracing::warn!("classifier disabled; items will report Loading");
            return;
        }
        Err(e) => {
            tracing::warn!(error = ?e, "classifier init failed");
            return;
        }
    };

    // One call so a cold hosted model starts loading before real traffic.
    let first_call = tokio::time::timeout(
        Duration::from_millis(settings.timeout_ms),
        model.predict("warm up"),
    )
    .await;
    match first_call {
        Ok(Ok(v)) => tracing::info!(category = %v.category, "classifier warm-up ok"),
        Ok(Err(e)) => tracing::warn!(error = ?e, "classifier warm-up failed; installing anyway"),
        Err(_) => tracing::warn!("classifier warm-up timed out; installing anyway"),
    }
    gateway.install(model);
}
