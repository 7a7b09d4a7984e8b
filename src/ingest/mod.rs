// src/ingest/mod.rs
//! Feed normalizer: turns loosely typed feed entries into canonical [`RawItem`]s,
//! deduplicated by canonical URL.

pub mod providers;
pub mod types;

use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::hash_map::{Entry, HashMap};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tracing::{debug, warn};

use crate::ingest::types::{FeedEntry, FeedSource, ParseError, RawItem};
use crate::source_weights::SourceWeightsConfig;

const MAX_TEXT_CHARS: usize = 5_000;

/// Normalize text: decode entities, strip tags, fold quotes and whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || matches!(k.as_str(), "fbclid" | "gclid" | "ocid")
}

/// Canonical form of a link: http(s) only, lowercase host, no fragment,
/// no tracking params, no trailing slash on non-root paths.
pub fn canonical_url(link: &str) -> Option<String> {
    let mut url = reqwest::Url::parse(link.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Some(url.to_string())
}

/// Accepts RFC 3339, RFC 2822 and the collector's naive ISO timestamps (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return DateTime::from_timestamp(dt.unix_timestamp(), 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|n| n.and_utc())
}

/// Validate and canonicalize a single entry.
pub fn normalize_entry(entry: &FeedEntry, weights: &SourceWeightsConfig) -> Result<RawItem, String> {
    let source_id = entry
        .source
        .as_deref()
        .map(normalize_text)
        .filter(|s| !s.is_empty())
        .map(|s| weights.canonical_source(&s))
        .filter(|s| !s.is_empty())
        .ok_or("missing source")?;
    let title = entry
        .title
        .as_deref()
        .map(normalize_text)
        .filter(|s| !s.is_empty())
        .ok_or("missing title")?;
    let canonical_url = entry
        .link
        .as_deref()
        .and_then(canonical_url)
        .ok_or("missing or invalid link")?;
    let published_at = entry
        .published
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or("missing or unparseable timestamp")?;
    let body_text = entry.body.as_deref().map(normalize_text).unwrap_or_default();

    let source_trust_weight = weights.weight_for(&source_id);
    Ok(RawItem {
        source_id,
        canonical_url,
        title,
        body_text,
        published_at,
        source_trust_weight,
    })
}

/// Output of one normalization pass.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Deduplicated items, ordered by (published_at, canonical_url).
    pub items: Vec<RawItem>,
    pub errors: Vec<ParseError>,
    pub duplicates: usize,
}

/// Normalize, drop malformed entries, dedupe by canonical URL.
///
/// On a URL conflict the item from the more trusted source wins; with equal
/// trust the last-seen item wins.
pub fn normalize_entries(entries: Vec<FeedEntry>, weights: &SourceWeightsConfig) -> NormalizedBatch {
    let mut errors = Vec::new();
    let mut duplicates = 0usize;
    let mut by_url: HashMap<String, RawItem> = HashMap::with_capacity(entries.len());

    for entry in &entries {
        let item = match normalize_entry(entry, weights) {
            Ok(item) => item,
            Err(reason) => {
                debug!(target: "ingest", locator = %entry.locator, %reason, "dropping entry");
                errors.push(ParseError {
                    locator: entry.locator.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }
        };
        match by_url.entry(item.canonical_url.clone()) {
            Entry::Vacant(v) => {
                v.insert(item);
            }
            Entry::Occupied(mut o) => {
                duplicates += 1;
                if item.source_trust_weight >= o.get().source_trust_weight {
                    o.insert(item);
                }
            }
        }
    }

    let mut items: Vec<RawItem> = by_url.into_values().collect();
    items.sort_by(|a, b| {
        a.published_at
            .cmp(&b.published_at)
            .then_with(|| a.canonical_url.cmp(&b.canonical_url))
    });

    counter!("ingest_entries_total").increment(entries.len() as u64);
    counter!("ingest_parse_errors_total").increment(errors.len() as u64);
    counter!("ingest_duplicates_total").increment(duplicates as u64);

    NormalizedBatch {
        items,
        errors,
        duplicates,
    }
}

/// Pull entries from every feed. A failing feed is logged and skipped.
pub async fn collect_entries(sources: &[Box<dyn FeedSource>]) -> Vec<FeedEntry> {
    let mut raw = Vec::new();
    for s in sources {
        match s.fetch_entries().await {
            Ok(mut v) => {
                debug!(target: "ingest", feed = s.name(), entries = v.len(), "feed fetched");
                raw.append(&mut v);
            }
            Err(e) => {
                warn!(target: "ingest", error = ?e, feed = s.name(), "feed error");
                counter!("ingest_feed_errors_total").increment(1);
            }
        }
    }
    raw
}
