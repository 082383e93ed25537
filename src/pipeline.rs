// src/pipeline.rs
//! Aggregation cycle: `COLLECTING → DEDUPING → RESOLVING → RANKED`.
//!
//! - COLLECTING: [`collect_all`] runs every adapter under a timeout.
//! - DEDUPING: malformed candidates are dropped, ids computed, repeats removed.
//! - RESOLVING: cache hits get a fresh confidence against the store; misses
//!   are classified concurrently (input order kept), admitted by source class,
//!   scored and inserted one by one so later items see earlier ones.
//! - RANKED: newest first, capped at `max_results`.
//!
//! Search runs the first two stages against `SourceAdapter::search`, then
//! classifies and admits without touching the store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::classify::{Category, ClassifierGateway, Verdict};
use crate::config::{AdmissionSettings, AggregatorConfig, PipelineSettings, SourceClass};
use crate::consensus;
use crate::event::{rank_newest_first, CandidateItem, EventRecord, EventView, FeedResponse};
use crate::ingest::rss::RssAdapter;
use crate::ingest::{collect_all, AdapterOutcome, Collected, DynAdapter, Request, SourceError};
use crate::store::{now_secs, EventStore};

/// Search results with a raw classifier confidence at or above this are `High`.
pub const SEARCH_HIGH_CUTOFF: f32 = 0.9;
pub const SEARCH_HIGH_CONFIDENCE: u8 = 90;
pub const SEARCH_LOW_CONFIDENCE: u8 = 60;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_cycles_total", "Aggregation cycles run.");
        describe_counter!(
            "pipeline_adapter_failures_total",
            "Adapters that failed, timed out or panicked."
        );
        describe_counter!(
            "pipeline_candidates_total",
            "Well-formed candidates seen after collection."
        );
        describe_counter!(
            "pipeline_duplicates_total",
            "Candidates dropped as repeats within a cycle."
        );
        describe_counter!("pipeline_cache_hits_total", "Candidates already in the store.");
        describe_counter!(
            "pipeline_rejected_total",
            "Novel candidates refused by the admission filter."
        );
        describe_counter!("pipeline_stored_total", "Novel events inserted into the store.");
        describe_histogram!("pipeline_cycle_ms", "Wall time of one cycle in milliseconds.");
        describe_histogram!("ingest_adapter_ms", "Per-adapter fetch time in milliseconds.");
        describe_gauge!("store_records", "Records currently held by the event store.");
        describe_counter!("store_evicted_total", "Records removed by retention sweeps.");
    });
}

/// Coarse outcome of one adapter, for reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Fetched,
    Empty,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn from_collected(c: &Collected) -> Self {
        let (status, error) = match &c.outcome {
            AdapterOutcome::Fetched(_) => (SourceStatus::Fetched, None),
            AdapterOutcome::Empty => (SourceStatus::Empty, None),
            AdapterOutcome::Failed(e @ SourceError::TimedOut(_)) => {
                (SourceStatus::TimedOut, Some(e.to_string()))
            }
            AdapterOutcome::Failed(e) => (SourceStatus::Failed, Some(e.to_string())),
        };
        Self {
            source: c.source.name.clone(),
            status,
            items: c.outcome.len(),
            error,
        }
    }
}

/// What happened during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub sources: Vec<SourceReport>,
    pub candidates: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub cache_hits: usize,
    pub misses: usize,
    pub rejected: usize,
    pub stored: usize,
    /// Hits whose record was evicted between lookup and refresh.
    pub vanished: usize,
}

impl CycleReport {
    pub fn failed_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Failed | SourceStatus::TimedOut))
            .count()
    }
}

/// Whether a novel item with this verdict may enter the store.
///
/// `Loading` never passes. `Other` has to clear `other_min`; every other
/// category clears the bar of its source class.
pub fn admit(verdict: &Verdict, class: SourceClass, bars: &AdmissionSettings) -> bool {
    match verdict.category {
        Category::Loading => false,
        Category::Other => verdict.confidence >= bars.other_min,
        _ => verdict.confidence >= bars.min_for(class),
    }
}

/// Fixed confidence tiers for search results.
pub fn search_confidence(raw: f32) -> u8 {
    if raw >= SEARCH_HIGH_CUTOFF {
        SEARCH_HIGH_CONFIDENCE
    } else {
        SEARCH_LOW_CONFIDENCE
    }
}

pub struct Aggregator {
    adapters: Vec<DynAdapter>,
    store: Arc<EventStore>,
    classifier: Arc<ClassifierGateway>,
    settings: PipelineSettings,
}

impl Aggregator {
    pub fn new(
        adapters: Vec<DynAdapter>,
        store: Arc<EventStore>,
        classifier: Arc<ClassifierGateway>,
        settings: PipelineSettings,
    ) -> Self {
        ensure_metrics_described();
        Self {
            adapters,
            store,
            classifier,
            settings,
        }
    }

    /// One HTTP RSS/Atom adapter per configured source, sharing a client.
    pub fn from_config(
        cfg: &AggregatorConfig,
        store: Arc<EventStore>,
        classifier: Arc<ClassifierGateway>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crisis-feed-aggregator/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.pipeline.adapter_timeout())
            .build()
            .context("building http client")?;

        let adapters: Vec<DynAdapter> = cfg
            .sources
            .iter()
            .map(|s| Arc::new(RssAdapter::http(s.clone(), client.clone())) as DynAdapter)
            .collect();
        tracing::info!(sources = adapters.len(), "aggregator configured");

        Ok(Self::new(adapters, store, classifier, cfg.pipeline.clone()))
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn classifier(&self) -> &Arc<ClassifierGateway> {
        &self.classifier
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn timeout(&self) -> Duration {
        self.settings.adapter_timeout()
    }

    pub async fn run_cycle(&self) -> (FeedResponse, CycleReport) {
        self.run_cycle_at(now_secs()).await
    }

    /// Live-feed cycle evaluated at `now` (unix seconds).
    pub async fn run_cycle_at(&self, now: f64) -> (FeedResponse, CycleReport) {
        let t0 = Instant::now();
        counter!("pipeline_cycles_total").increment(1);

        // COLLECTING
        let collected = collect_all(
            &self.adapters,
            Request::Live,
            self.timeout(),
            self.settings.max_items_per_source,
        )
        .await;

        // DEDUPING
        let mut report = CycleReport::default();
        let unique = dedupe(collected, now, &mut report);

        // RESOLVING
        let (hits, misses): (Vec<_>, Vec<_>) = unique
            .into_iter()
            .partition(|(id, _)| self.store.lookup(id).is_some());
        report.cache_hits = hits.len();
        report.misses = misses.len();

        let mut views: Vec<EventView> = Vec::with_capacity(hits.len() + misses.len());

        // Refreshing a hit only moves its own confidence, which no other
        // record's score depends on, so one snapshot serves every hit.
        let pool = self.store.all_live();
        for (id, _) in &hits {
            let Some(current) = pool.iter().find(|r| &r.id == id) else {
                report.vanished += 1;
                continue;
            };
            let confidence = consensus::score(current, &pool, now);
            match self.store.refresh_confidence(id, confidence) {
                Some(rec) => views.push(rec.view()),
                None => report.vanished += 1,
            }
        }

        let titles: Vec<String> = misses.iter().map(|(_, item)| item.title.clone()).collect();
        let verdicts = self.classify_all(titles).await;
        for ((id, item), verdict) in misses.into_iter().zip(verdicts) {
            if !admit(&verdict, item.source_class, &self.settings.admission) {
                tracing::debug!(
                    id = %id,
                    source = %item.source_name,
                    category = %verdict.category,
                    raw = verdict.confidence,
                    "candidate not admitted"
                );
                report.rejected += 1;
                continue;
            }
            let mut record = EventRecord::from_candidate(&item, id, verdict.category);
            let pool = self.store.all_live();
            record.confidence = consensus::score(&record, &pool, now);
            let (stored, inserted) = self.store.insert_or_refresh(record);
            if inserted {
                report.stored += 1;
            } else {
                // Another cycle inserted it after our lookup.
                report.cache_hits += 1;
            }
            views.push(stored.view());
        }

        // RANKED
        let ranked = rank_newest_first(views, self.settings.max_results);

        counter!("pipeline_duplicates_total").increment(report.duplicates as u64);
        counter!("pipeline_cache_hits_total").increment(report.cache_hits as u64);
        counter!("pipeline_rejected_total").increment(report.rejected as u64);
        counter!("pipeline_stored_total").increment(report.stored as u64);
        histogram!("pipeline_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            target: "pipeline",
            candidates = report.candidates,
            malformed = report.malformed,
            duplicates = report.duplicates,
            hits = report.cache_hits,
            misses = report.misses,
            rejected = report.rejected,
            stored = report.stored,
            failed_sources = report.failed_sources(),
            returned = ranked.len(),
            "cycle complete"
        );

        (FeedResponse::success(ranked), report)
    }

    pub async fn search(&self, query: &str) -> FeedResponse {
        self.search_at(query, now_secs()).await.0
    }

    /// Ad-hoc search evaluated at `now`. The store is neither read nor written.
    pub async fn search_at(&self, query: &str, now: f64) -> (FeedResponse, CycleReport) {
        let query = query.trim();
        if query.is_empty() {
            return (
                FeedResponse::error("search query must not be empty"),
                CycleReport::default(),
            );
        }

        let collected = collect_all(
            &self.adapters,
            Request::Search(query.to_string()),
            self.timeout(),
            self.settings.search_items_per_source,
        )
        .await;

        let mut report = CycleReport::default();
        let unique = dedupe(collected, now, &mut report);
        report.misses = unique.len();

        let titles: Vec<String> = unique.iter().map(|(_, item)| item.title.clone()).collect();
        let verdicts = self.classify_all(titles).await;
        let mut views = Vec::new();
        for ((id, item), verdict) in unique.into_iter().zip(verdicts) {
            if !admit(&verdict, item.source_class, &self.settings.admission) {
                report.rejected += 1;
                continue;
            }
            let mut record = EventRecord::from_candidate(&item, id, verdict.category);
            record.confidence = search_confidence(verdict.confidence);
            views.push(record.view());
        }

        let ranked = rank_newest_first(views, self.settings.max_results);
        tracing::info!(
            target: "pipeline",
            query = %query,
            candidates = report.candidates,
            rejected = report.rejected,
            returned = ranked.len(),
            "search complete"
        );
        (FeedResponse::success(ranked), report)
    }

    /// Classify titles concurrently; verdicts come back in input order.
    async fn classify_all(&self, titles: Vec<String>) -> Vec<Verdict> {
        let gateway = Arc::clone(&self.classifier);
        stream::iter(titles)
            .map(move |title| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.classify(&title).await }
            })
            .buffered(self.settings.classify_concurrency.max(1))
            .collect()
            .await
    }
}

/// Validate, identify and de-duplicate everything collected, in adapter order.
fn dedupe(
    collected: Vec<Collected>,
    now: f64,
    report: &mut CycleReport,
) -> Vec<(String, CandidateItem)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for c in collected {
        report.sources.push(SourceReport::from_collected(&c));
        let Collected { source, outcome } = c;
        let AdapterOutcome::Fetched(raws) = outcome else {
            continue;
        };
        for raw in raws {
            let Some(item) = CandidateItem::from_raw(raw, &source, now) else {
                report.malformed += 1;
                continue;
            };
            report.candidates += 1;
            let id = item.id();
            if seen.insert(id.clone()) {
                out.push((id, item));
            } else {
                report.duplicates += 1;
            }
        }
    }

    if report.malformed > 0 {
        tracing::debug!(malformed = report.malformed, "dropped malformed candidates");
    }
    counter!("pipeline_candidates_total").increment(report.candidates as u64);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(category: Category, confidence: f32) -> Verdict {
        Verdict {
            category,
            confidence,
        }
    }

    #[test]
    fn admission_follows_source_class() {
        let bars = AdmissionSettings::default();
        assert!(admit(&v(Category::Flood, 0.65), SourceClass::Curated, &bars));
        assert!(!admit(&v(Category::Flood, 0.65), SourceClass::BroadNet, &bars));
        assert!(admit(&v(Category::Flood, 0.75), SourceClass::BroadNet, &bars));
    }

    #[test]
    fn admission_is_strict_for_other_and_loading() {
        let bars = AdmissionSettings::default();
        assert!(!admit(&Verdict::LOADING, SourceClass::Curated, &bars));
        assert!(!admit(&v(Category::Loading, 1.0), SourceClass::Curated, &bars));
        assert!(!admit(&v(Category::Other, 0.9), SourceClass::Curated, &bars));
        assert!(admit(&v(Category::Other, 0.95), SourceClass::BroadNet, &bars));
    }

    #[test]
    fn search_tiers() {
        assert_eq!(search_confidence(0.95), 90);
        assert_eq!(search_confidence(0.9), 90);
        assert_eq!(search_confidence(0.89), 60);
    }

    #[test]
    fn report_counts_failures() {
        let r = CycleReport {
            sources: vec![
                SourceReport {
                    source: "a".into(),
                    status: SourceStatus::TimedOut,
                    items: 0,
                    error: None,
                },
                SourceReport {
                    source: "b".into(),
                    status: SourceStatus::Empty,
                    items: 0,
                    error: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(r.failed_sources(), 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    // axum handlers await these futures, so they must stay Send.
    #[test]
    fn cycle_and_search_futures_are_send() {
        let agg = Aggregator::new(
            vec![],
            Arc::new(EventStore::new()),
            Arc::new(ClassifierGateway::default()),
            PipelineSettings::default(),
        );
        assert_send(&agg.run_cycle_at(0.0));
        assert_send(&agg.search_at("flood", 0.0));
        assert_send(&agg.classify_all(vec!["flood".into()]));
    }
}
