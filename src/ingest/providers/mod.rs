// src/ingest/providers/mod.rs
pub mod rss;
pub mod snapshot;

use crate::config::{FeedKind, FeedSpec};
use crate::ingest::types::FeedSource;

/// Build feed adapters from configuration. Specs missing their url/path are skipped.
pub fn build_sources(specs: &[FeedSpec], client: &reqwest::Client) -> Vec<Box<dyn FeedSource>> {
    let mut out: Vec<Box<dyn FeedSource>> = Vec::with_capacity(specs.len());
    for spec in specs {
        match (spec.kind, &spec.url, &spec.path) {
            (FeedKind::Rss, Some(url), _) => out.push(Box::new(
                rss::RssFeed::from_url(&spec.name, url, client.clone())
                    .with_limit(spec.limit.unwrap_or(rss::DEFAULT_ENTRY_LIMIT)),
            )),
            (FeedKind::Rss, None, Some(path)) => out.push(Box::new(
                rss::RssFeed::from_file(&spec.name, path)
                    .with_limit(spec.limit.unwrap_or(rss::DEFAULT_ENTRY_LIMIT)),
            )),
            (FeedKind::Snapshot, _, Some(path)) => {
                out.push(Box::new(snapshot::SnapshotFeed::from_path(&spec.name, path)))
            }
            _ => tracing::warn!(target: "ingest", feed = %spec.name, "feed spec has no url/path, skipping"),
        }
    }
    out
}
