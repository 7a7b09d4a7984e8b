// src/ingest/providers/snapshot.rs
//! Adapter for the collector's JSON snapshots:
//!
//! ```json
//! { "metadata": { "collected_at": "..." },
//!   "news": { "<source>": { "<category>": [ { "title": "...", "link": "...",
//!             "description": "...", "published": "...", "source": "..." } ] } } }
//! ```
//!
//! Field names vary between collectors, so a few aliases are accepted per field.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ingest::types::{FeedEntry, FeedSource};

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    news: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
}

enum Mode {
    Inline(String),
    Path(PathBuf),
}

pub struct SnapshotFeed {
    name: String,
    mode: Mode,
}

impl SnapshotFeed {
    pub fn from_json(name: &str, json: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Inline(json.to_string()),
        }
    }

    /// `path` may be a snapshot file or a directory of `news_*.json` files,
    /// in which case the newest one (by name) is read.
    pub fn from_path(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Path(path.to_path_buf()),
        }
    }

    fn parse_entries(&self, json: &str) -> Result<Vec<FeedEntry>> {
        let snap: Snapshot = serde_json::from_str(json).context("parsing news snapshot")?;
        let mut out = Vec::new();
        for (source, categories) in snap.news {
            for (category, articles) in categories {
                for (idx, art) in articles.iter().enumerate() {
                    out.push(FeedEntry {
                        locator: format!("{}/{source}/{category}#{idx}", self.name),
                        source: pick(art, &["source", "source_name", "publisher"])
                            .or_else(|| Some(source.clone())),
                        title: pick(art, &["title", "headline"]),
                        link: pick(art, &["link", "url", "canonical_url"]),
                        body: pick(art, &["description", "summary", "body", "content"]),
                        published: pick(art, &["published", "pubDate", "published_at", "date"]),
                    });
                }
            }
        }
        Ok(out)
    }
}

/// First non-empty string value among `keys`.
fn pick(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| v.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Newest `news_*.json` in `dir`, ordered by file name (names embed the timestamp).
pub fn latest_snapshot(dir: &Path) -> Result<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("news_") && n.ends_with(".json"))
        })
        .collect();
    files.sort();
    files
        .pop()
        .ok_or_else(|| anyhow!("no news_*.json snapshot in {}", dir.display()))
}

#[async_trait]
impl FeedSource for SnapshotFeed {
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>> {
        match &self.mode {
            Mode::Inline(s) => self.parse_entries(s),
            Mode::Path(path) => {
                let file = if path.is_dir() {
                    latest_snapshot(path)?
                } else {
                    path.clone()
                };
                let body = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                self.parse_entries(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
