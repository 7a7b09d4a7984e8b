// src/analyze/cluster.rs
//! Story clustering.
//!
//! Items are visited in the total order (published_at, canonical_url, source_id),
//! so the result does not depend on input order. Each item is compared with the
//! representative (earliest member) of every open cluster. It joins when
//! similarity >= threshold and it was published within the window of that
//! representative. Matching several clusters merges them.
//!
//! Invariant: every member lies within `window_secs` of the cluster's earliest
//! member. A merge keeps it because the new item is within the window of every
//! merged representative and is the latest item seen so far.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::debug;

use crate::analyze::similarity::ItemProfile;
use crate::analyze::ValidationParams;
use crate::ingest::types::RawItem;

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub cluster_id: String,
    /// Ordered by (published_at, canonical_url, source_id).
    pub items: Vec<RawItem>,
    pub window_secs: i64,
}

impl Cluster {
    /// Earliest member; the cluster id is derived from its URL.
    pub fn representative(&self) -> &RawItem {
        &self.items[0]
    }

    pub fn earliest(&self) -> DateTime<Utc> {
        self.representative().published_at
    }

    pub fn distinct_sources(&self) -> BTreeSet<&str> {
        self.items.iter().map(|i| i.source_id.as_str()).collect()
    }
}

/// Stable story id: short SHA-256 of the representative's canonical URL.
pub fn cluster_id_for(representative_url: &str) -> String {
    let digest = Sha256::digest(representative_url.as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

fn order_key(item: &RawItem) -> (DateTime<Utc>, &str, &str) {
    (item.published_at, &item.canonical_url, &item.source_id)
}

/// Partition `items` into clusters.
pub fn cluster_items(items: &[RawItem], params: &ValidationParams) -> Vec<Cluster> {
    let mut sorted: Vec<&RawItem> = items.iter().collect();
    sorted.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
    let profiles: Vec<ItemProfile> = sorted.iter().map(|i| ItemProfile::of(i)).collect();

    // Each group holds indexes into `sorted`, ascending; groups[g][0] is the representative.
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for idx in 0..sorted.len() {
        let t = sorted[idx].published_at;
        let matches: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| {
                let rep = g[0];
                (t - sorted[rep].published_at).num_seconds() <= params.window_secs
                    && profiles[idx].similarity(&profiles[rep]) >= params.similarity_threshold
            })
            .map(|(gi, _)| gi)
            .collect();

        match matches.as_slice() {
            [] => groups.push(vec![idx]),
            [only] => groups[*only].push(idx),
            [first, rest @ ..] => {
                // Groups are created in representative order, so `first` has the earliest one.
                let mut merged = std::mem::take(&mut groups[*first]);
                for gi in rest {
                    merged.append(&mut groups[*gi]);
                }
                merged.push(idx);
                merged.sort_unstable();
                debug!(target: "cluster", merged = rest.len() + 1, "item bridged clusters");
                groups[*first] = merged;
                groups.retain(|g| !g.is_empty());
            }
        }
    }

    groups
        .into_iter()
        .map(|g| {
            let members: Vec<RawItem> = g.into_iter().map(|i| sorted[i].clone()).collect();
            Cluster {
                cluster_id: cluster_id_for(&members[0].canonical_url),
                items: members,
                window_secs: params.window_secs,
            }
        })
        .collect()
}
