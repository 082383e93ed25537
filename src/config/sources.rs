// src/config/sources.rs
//! Source descriptors: who we poll, how much we trust them, and how noisy
//! they are.

use serde::{Deserialize, Serialize};

/// Signal quality of a source. Drives the admission filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    /// High-signal, editorially curated feeds (e.g. GDACS).
    Curated,
    /// Wide nets with a lot of noise (aggregators, social media).
    BroadNet,
}

/// One configured source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Credibility contribution to confidence, `0..=100`.
    pub trust_weight: u8,
    #[serde(default = "default_class")]
    pub class: SourceClass,
    /// Live feed endpoint.
    pub url: String,
    /// Search endpoint template; `{query}` is replaced with the URL-encoded
    /// query. Without it, search falls back to filtering the live feed.
    #[serde(default)]
    pub search_url: Option<String>,
}

fn default_class() -> SourceClass {
    SourceClass::BroadNet
}

impl SourceConfig {
    pub fn new(name: &str, trust_weight: u8, class: SourceClass, url: &str) -> Self {
        Self {
            name: name.to_string(),
            trust_weight: trust_weight.min(100),
            class,
            url: url.to_string(),
            search_url: None,
        }
    }

    pub fn with_search_url(mut self, template: &str) -> Self {
        self.search_url = Some(template.to_string());
        self
    }

    /// Expand the search template for `query`, if this source has one.
    pub fn search_endpoint(&self, query: &str) -> Option<String> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.search_url
            .as_ref()
            .map(|t| t.replace("{query}", &encoded))
    }
}

/// Built-in source list used when no config file is present.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "Reddit",
            40,
            SourceClass::BroadNet,
            "https://www.reddit.com/r/worldnews+news+disaster+emergency+earthquakes.rss",
        )
        .with_search_url(
            "https://www.reddit.com/r/worldnews+news+disaster+emergency+earthquakes/search.rss?q={query}&sort=new&restrict_sr=on",
        ),
        SourceConfig::new(
            "GDACS",
            90,
            SourceClass::Curated,
            "https://www.gdacs.org/xml/rss.xml",
        ),
        SourceConfig::new(
            "Google News",
            60,
            SourceClass::BroadNet,
            "https://news.google.com/rss/search?q=earthquake+OR+flood+OR+fire+OR+tsunami+when:1h&hl=en-US&gl=US&ceid=US:en",
        )
        .with_search_url("https://news.google.com/rss/search?q={query}&hl=en-US&gl=US&ceid=US:en"),
    ]
}
