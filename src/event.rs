//! # Event model
//!
//! Shapes that flow through the pipeline:
//! - `RawCandidate`: what an adapter parsed, fields still optional.
//! - `CandidateItem`: validated candidate carrying its source's trust weight.
//! - `EventRecord`: the classified, scored record kept in the store.
//! - `EventView` / `FeedResponse`: the wire contract for consumers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classify::Category;
use crate::config::{SourceClass, SourceConfig};
use crate::ingest::normalize_text;

/// Adapter output before validation. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Unix seconds, if the feed carried a usable date.
    pub published_at: Option<f64>,
}

impl RawCandidate {
    pub fn new(title: &str, link: &str, published_at: Option<f64>) -> Self {
        Self {
            title: Some(title.to_string()),
            link: Some(link.to_string()),
            published_at,
        }
    }
}

/// A validated candidate, bound to the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub title: String,
    pub link: String,
    pub source_name: String,
    pub trust_weight: u8,
    pub source_class: SourceClass,
    pub published_at: f64,
}

impl CandidateItem {
    /// Validate a raw candidate. Returns `None` for a blank title or link.
    /// A missing or non-finite timestamp falls back to `ingested_at`.
    pub fn from_raw(raw: RawCandidate, source: &SourceConfig, ingested_at: f64) -> Option<Self> {
        let title = normalize_text(raw.title.as_deref()?);
        let link = raw.link?.trim().to_string();
        if title.is_empty() || link.is_empty() {
            return None;
        }
        let published_at = raw
            .published_at
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(ingested_at);

        Some(Self {
            title,
            link,
            source_name: source.name.clone(),
            trust_weight: source.trust_weight.min(100),
            source_class: source.class,
            published_at,
        })
    }

    /// Content identity of this candidate.
    pub fn id(&self) -> String {
        event_id(&self.title, &self.link)
    }
}

/// Deterministic identity for `(title, link)`.
///
/// The title is HTML-decoded, whitespace-collapsed and lowercased; the link is
/// trimmed. SHA-256 over both, truncated to 16 bytes of lowercase hex.
pub fn event_id(title: &str, link: &str) -> String {
    let norm_title = normalize_text(title).to_lowercase();
    let norm_link = link.trim();

    let mut hasher = Sha256::new();
    hasher.update(norm_title.as_bytes());
    hasher.update(norm_link.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Classified, scored event kept in the [`EventStore`](crate::store::EventStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub category: Category,
    /// Event time, unix seconds.
    pub timestamp: f64,
    pub trust_weight: u8,
    /// Consensus-adjusted score in `0..=100`.
    pub confidence: u8,
}

impl EventRecord {
    pub fn from_candidate(item: &CandidateItem, id: String, category: Category) -> Self {
        Self {
            id,
            title: item.title.clone(),
            url: item.link.clone(),
            source_name: item.source_name.clone(),
            category,
            timestamp: item.published_at,
            trust_weight: item.trust_weight.min(100),
            confidence: 0,
        }
    }

    /// Records that can take part in a consensus scan.
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty()
            && !self.title.trim().is_empty()
            && self.timestamp.is_finite()
            && self.category != Category::Loading
    }

    pub fn view(&self) -> EventView {
        EventView {
            id: self.id.clone(),
            title: self.title.clone(),
            category: self.category,
            confidence: self.confidence,
            url: self.url.clone(),
            source_name: self.source_name.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// One row of the consumer-facing feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub confidence: u8,
    pub url: String,
    pub source_name: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Response envelope shared by the live feed and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub status: Status,
    pub data: Vec<EventView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FeedResponse {
    pub fn success(data: Vec<EventView>) -> Self {
        Self {
            status: Status::Success,
            data,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: Vec::new(),
            message: Some(message.into()),
        }
    }
}

/// Sort newest first and cap the length.
pub fn rank_newest_first(mut views: Vec<EventView>, max_results: usize) -> Vec<EventView> {
    views.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
    views.truncate(max_results);
    views
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceConfig {
        SourceConfig::new("GDACS", 90, SourceClass::Curated, "https://example.test/rss")
    }

    #[test]
    fn id_is_stable_and_normalized() {
        let a = event_id("Flood warning issued", "https://x.test/1");
        let b = event_id("  flood   WARNING issued ", " https://x.test/1 ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, event_id("Flood warning issued", "https://x.test/2"));
    }

    #[test]
    fn id_known_value_does_not_drift() {
        // Pinned so identities survive restarts and snapshot reloads.
        let id = event_id("a", "b");
        let mut hasher = Sha256::new();
        hasher.update(b"ab");
        let expected: String = hasher.finalize()[..16]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_eq!(id, expected);
    }

    #[test]
    fn malformed_candidates_are_rejected() {
        let src = source();
        let no_title = RawCandidate {
            title: None,
            link: Some("https://x".into()),
            published_at: None,
        };
        assert!(CandidateItem::from_raw(no_title, &src, 10.0).is_none());

        let blank_link = RawCandidate::new("Storm", "   ", Some(5.0));
        assert!(CandidateItem::from_raw(blank_link, &src, 10.0).is_none());
    }

    #[test]
    fn missing_timestamp_falls_back_to_ingestion_time() {
        let src = source();
        let c = CandidateItem::from_raw(RawCandidate::new("Storm", "https://x", None), &src, 42.0)
            .unwrap();
        assert_eq!(c.published_at, 42.0);
        assert_eq!(c.trust_weight, 90);
        assert_eq!(c.source_name, "GDACS");
    }

    #[test]
    fn ranking_is_newest_first_and_bounded() {
        let mk = |ts: f64| EventView {
            id: format!("{ts}"),
            title: "t".into(),
            category: Category::Fire,
            confidence: 50,
            url: "u".into(),
            source_name: "s".into(),
            timestamp: ts,
        };
        let out = rank_newest_first(vec![mk(1.0), mk(3.0), mk(2.0)], 2);
        let ts: Vec<f64> = out.iter().map(|v| v.timestamp).collect();
        assert_eq!(ts, vec![3.0, 2.0]);
    }

    #[test]
    fn view_serializes_camel_case() {
        let v = EventView {
            id: "x".into(),
            title: "t".into(),
            category: Category::MedicalEmergency,
            confidence: 70,
            url: "u".into(),
            source_name: "Reddit".into(),
            timestamp: 1.0,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["sourceName"], "Reddit");
        assert_eq!(json["category"], "Medical Emergency");
    }
}
