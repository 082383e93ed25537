// src/ingest/rss.rs
//! RSS 2.0 / Atom adapter. Reads over HTTP or from an in-memory fixture.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use super::{filter_by_title, SourceAdapter, SourceError};
use crate::config::SourceConfig;
use crate::event::RawCandidate;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<f64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp() as f64)
}

fn parse_rfc3339(ts: &str) -> Option<f64> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .map(|dt| dt.unix_timestamp() as f64)
}

/// Parse an RSS 2.0 or Atom document into raw candidates.
pub fn parse_feed(xml: &str) -> anyhow::Result<Vec<RawCandidate>> {
    let xml = scrub_html_entities_for_xml(xml);
    let looks_atom = xml.contains("<feed") && !xml.contains("<rss");

    if !looks_atom {
        let rss: Rss = from_str(&xml).context("parsing rss xml")?;
        return Ok(rss
            .channel
            .item
            .into_iter()
            .map(|it| RawCandidate {
                title: it.title,
                link: it.link,
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
            })
            .collect());
    }

    let feed: AtomFeed = from_str(&xml).context("parsing atom xml")?;
    Ok(feed
        .entry
        .into_iter()
        .map(|e| {
            let link = e
                .link
                .iter()
                .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
                .or_else(|| e.link.first())
                .and_then(|l| l.href.clone());
            let published_at = e
                .published
                .as_deref()
                .or(e.updated.as_deref())
                .and_then(parse_rfc3339);
            RawCandidate {
                title: e.title.map(|t| t.value),
                link,
                published_at,
            }
        })
        .collect())
}

enum Mode {
    Fixture(String),
    Http(reqwest::Client),
}

pub struct RssAdapter {
    source: SourceConfig,
    mode: Mode,
}

impl RssAdapter {
    /// Adapter that polls `source.url` (and `source.search_url` for search).
    pub fn http(source: SourceConfig, client: reqwest::Client) -> Self {
        Self {
            source,
            mode: Mode::Http(client),
        }
    }

    /// Adapter that serves a fixed document; search filters it locally.
    pub fn from_fixture(source: SourceConfig, xml: &str) -> Self {
        Self {
            source,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    async fn load(&self, url: &str) -> Result<Vec<RawCandidate>, SourceError> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http(client) => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))
                    .map_err(SourceError::Fetch)?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(SourceError::Fetch(anyhow!("GET {url} returned {status}")));
                }
                resp.text()
                    .await
                    .context("reading feed body")
                    .map_err(SourceError::Fetch)?
            }
        };

        let t0 = std::time::Instant::now();
        let items = parse_feed(&body).map_err(SourceError::Parse)?;
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total").increment(items.len() as u64);
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn source(&self) -> &SourceConfig {
        &self.source
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>, SourceError> {
        self.load(&self.source.url).await
    }

    async fn search(&self, query: &str) -> Result<Vec<RawCandidate>, SourceError> {
        match (&self.mode, self.source.search_endpoint(query)) {
            (Mode::Http(_), Some(endpoint)) => self.load(&endpoint).await,
            _ => Ok(filter_by_title(self.fetch().await?, query)),
        }
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
