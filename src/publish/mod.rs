// src/publish/mod.rs
//! Publication gatekeeping: at most one publication per story per period, and
//! no two stories with identical content.

pub mod ledger;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::PeriodGranularity;
use crate::generate::GeneratedArticle;
pub use ledger::{
    JsonFileLedger, MemoryLedger, PublicationLedger, PublicationRecord, RecordOutcome,
};

/// SHA-256 hex of the article text after whitespace collapse and lowercasing,
/// so reflowed copies of one text hash the same.
pub fn content_hash(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// UTC dedup window key for a run started at `at`.
pub fn period_key(at: DateTime<Utc>, granularity: PeriodGranularity) -> String {
    match granularity {
        PeriodGranularity::Daily => at.format("%Y-%m-%d").to_string(),
        PeriodGranularity::Hourly => at.format("%Y-%m-%dT%H").to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationOutcome {
    Published(PublicationRecord),
    /// The story already has a record for this period. No-op.
    AlreadyPublished(PublicationRecord),
    /// A different story already published the same content.
    DuplicateContent(PublicationRecord),
}

pub struct Gatekeeper {
    ledger: Arc<dyn PublicationLedger>,
    period_key: String,
}

impl Gatekeeper {
    pub fn new(ledger: Arc<dyn PublicationLedger>, period_key: impl Into<String>) -> Self {
        Self {
            ledger,
            period_key: period_key.into(),
        }
    }

    /// Cheap pre-check so published stories cost no provider call.
    pub async fn already_published(&self, story_id: &str) -> Result<Option<PublicationRecord>> {
        self.ledger.find(story_id, &self.period_key).await
    }

    pub async fn publish(&self, article: &GeneratedArticle) -> Result<PublicationOutcome> {
        let record = PublicationRecord {
            story_id: article.story_id.clone(),
            period_key: self.period_key.clone(),
            content_hash: article.content_hash.clone(),
            published_at: Utc::now(),
        };
        let outcome = match self.ledger.record_if_absent(record.clone()).await? {
            RecordOutcome::Recorded => {
                counter!("publications_total").increment(1);
                info!(
                    target: "publish",
                    story_id = %record.story_id,
                    period = %record.period_key,
                    hash = &record.content_hash[..12.min(record.content_hash.len())],
                    "published"
                );
                PublicationOutcome::Published(record)
            }
            RecordOutcome::StoryExists(existing) => {
                info!(target: "publish", story_id = %existing.story_id, "already published this period");
                PublicationOutcome::AlreadyPublished(existing)
            }
            RecordOutcome::HashExists(existing) => {
                counter!("publication_conflicts_total").increment(1);
                warn!(
                    target: "publish",
                    story_id = %record.story_id,
                    existing = %existing.story_id,
                    "duplicate content hash"
                );
                PublicationOutcome::DuplicateContent(existing)
            }
        };
        Ok(outcome)
    }
}
