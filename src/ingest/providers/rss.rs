// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::types::{FeedEntry, FeedSource};

/// The collector reads at most this many entries per feed.
pub const DEFAULT_ENTRY_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    /// Aggregators (Google News) name the original publisher here.
    source: Option<ItemSource>,
}

#[derive(Debug, Deserialize)]
struct ItemSource {
    #[serde(rename = "$text", default)]
    name: Option<String>,
}

enum Mode {
    Fixture(String),
    File(PathBuf),
    Http { url: String, client: reqwest::Client },
}

/// RSS 2.0 adapter.
pub struct RssFeed {
    name: String,
    limit: usize,
    mode: Mode,
}

impl RssFeed {
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self::with_mode(name, Mode::Fixture(xml.to_string()))
    }

    pub fn from_file(name: &str, path: &Path) -> Self {
        Self::with_mode(name, Mode::File(path.to_path_buf()))
    }

    pub fn from_url(name: &str, url: &str, client: reqwest::Client) -> Self {
        Self::with_mode(
            name,
            Mode::Http {
                url: url.to_string(),
                client,
            },
        )
    }

    fn with_mode(name: &str, mode: Mode) -> Self {
        Self {
            name: name.to_string(),
            limit: DEFAULT_ENTRY_LIMIT,
            mode,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn parse_entries(&self, xml: &str) -> Result<Vec<FeedEntry>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).with_context(|| format!("parsing rss for {}", self.name))?;

        let channel_title = rss.channel.title.filter(|t| !t.trim().is_empty());
        let out = rss
            .channel
            .item
            .into_iter()
            .take(self.limit)
            .enumerate()
            .map(|(idx, it)| FeedEntry {
                locator: format!("{}#{}", self.name, idx),
                source: it
                    .source
                    .and_then(|s| s.name)
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| channel_title.clone())
                    .or_else(|| Some(self.name.clone())),
                title: it.title,
                link: it.link,
                body: it.description,
                published: it.pub_date,
            })
            .collect();

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_entries(s),
            Mode::File(path) => {
                let body = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                self.parse_entries(&body)
            }
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} non-2xx", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_entries(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// quick-xml only knows the XML entities; feeds happily use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&middot;", "·")
}
