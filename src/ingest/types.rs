// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Loosely typed entry as handed over by a feed adapter. Nothing is validated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Where the entry came from inside its feed, e.g. "yonhap#3".
    pub locator: String,
    pub source: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub body: Option<String>,
    pub published: Option<String>,
}

/// Canonical news item. Built only by [`normalize_entries`](crate::ingest::normalize_entries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub source_id: String,
    pub canonical_url: String,
    pub title: String,
    pub body_text: String,
    pub published_at: DateTime<Utc>,
    /// Static trust weight in [0, 1].
    pub source_trust_weight: f64,
}

impl RawItem {
    /// Title and body joined, as used for similarity and claim extraction.
    pub fn full_text(&self) -> String {
        if self.body_text.is_empty() {
            self.title.clone()
        } else {
            format!("{}. {}", self.title, self.body_text)
        }
    }
}

/// A dropped entry and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub locator: String,
    pub reason: String,
}

/// Adapter boundary: each source-specific parser yields `FeedEntry` values.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>>;
    fn name(&self) -> &str;
}
