// src/ingest/mod.rs
//! Source adapters and the COLLECTING stage.
//!
//! Every adapter runs in its own task under a timeout. Each one reports an
//! explicit [`AdapterOutcome`]; a failed, stalled or panicking adapter never
//! takes its siblings down with it.

pub mod rss;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinSet;

use crate::config::SourceConfig;
use crate::event::RawCandidate;

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = RE_TAGS.replace_all(&out, "").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("parse failed: {0:#}")]
    Parse(anyhow::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("adapter task panicked")]
    Panicked,
}

/// A source of candidate items. Implementations should be cheap to share.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> &SourceConfig;

    async fn fetch(&self) -> Result<Vec<RawCandidate>, SourceError>;

    /// Ad-hoc search. Default: the live feed filtered by a case-insensitive
    /// substring match on the title.
    async fn search(&self, query: &str) -> Result<Vec<RawCandidate>, SourceError> {
        Ok(filter_by_title(self.fetch().await?, query))
    }
}

/// Keep candidates whose title contains `query`, ignoring case.
pub fn filter_by_title(items: Vec<RawCandidate>, query: &str) -> Vec<RawCandidate> {
    let q = query.to_lowercase();
    items
        .into_iter()
        .filter(|c| {
            c.title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&q))
        })
        .collect()
}

pub type DynAdapter = Arc<dyn SourceAdapter>;

/// What one adapter produced in one cycle.
#[derive(Debug)]
pub enum AdapterOutcome {
    Fetched(Vec<RawCandidate>),
    Empty,
    Failed(SourceError),
}

impl AdapterOutcome {
    fn from_result(res: Result<Vec<RawCandidate>, SourceError>) -> Self {
        match res {
            Ok(v) if v.is_empty() => AdapterOutcome::Empty,
            Ok(v) => AdapterOutcome::Fetched(v),
            Err(e) => AdapterOutcome::Failed(e),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AdapterOutcome::Failed(_))
    }

    pub fn len(&self) -> usize {
        match self {
            AdapterOutcome::Fetched(v) => v.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one adapter, tagged with its source.
#[derive(Debug)]
pub struct Collected {
    pub source: SourceConfig,
    pub outcome: AdapterOutcome,
}

#[derive(Debug, Clone)]
pub enum Request {
    Live,
    Search(String),
}

/// Run every adapter concurrently; results come back in adapter order.
/// At most `per_source_limit` items are kept from each adapter.
pub async fn collect_all(
    adapters: &[DynAdapter],
    request: Request,
    timeout: Duration,
    per_source_limit: usize,
) -> Vec<Collected> {
    let mut set = JoinSet::new();
    for (idx, adapter) in adapters.iter().enumerate() {
        let adapter = Arc::clone(adapter);
        let request = request.clone();
        set.spawn(async move {
            let t0 = Instant::now();
            let call = async {
                match &request {
                    Request::Live => adapter.fetch().await,
                    Request::Search(q) => adapter.search(q).await,
                }
            };
            let res = match tokio::time::timeout(timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(SourceError::TimedOut(timeout)),
            };
            histogram!("ingest_adapter_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            (idx, res)
        });
    }

    let mut slots: Vec<Option<AdapterOutcome>> = (0..adapters.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, res)) => {
                let res = res.map(|mut v| {
                    v.truncate(per_source_limit);
                    v
                });
                slots[idx] = Some(AdapterOutcome::from_result(res));
            }
            // The index is lost with the panic; unfilled slots are marked below.
            Err(e) => tracing::error!(error = ?e, "adapter task failed to join"),
        }
    }

    adapters
        .iter()
        .zip(slots)
        .map(|(adapter, slot)| {
            let outcome = slot.unwrap_or(AdapterOutcome::Failed(SourceError::Panicked));
            let source = adapter.source().clone();
            match &outcome {
                AdapterOutcome::Failed(e) => {
                    tracing::warn!(source = %source.name, error = %e, "source unavailable");
                    counter!("pipeline_adapter_failures_total").increment(1);
                }
                other => {
                    tracing::debug!(source = %source.name, items = other.len(), "source collected");
                }
            }
            Collected { source, outcome }
        })
        .collect()
}
