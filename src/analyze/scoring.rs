//! Cross-validation scoring.
//!
//! score = clamp01( Σ trust_i · agreement_i / Σ trust_i ) over distinct sources.
//!
//! agreement_i is the share of source i's shared topics (topics at least one
//! other source speaks to) where its stance is compatible with the
//! trust-weighted majority. A source sharing no topic gets the configured
//! orthogonal value (0.5 by default).
//!
//! Sums run over sources in id order, so recomputing from the same cluster is
//! bit-identical.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::claims::ClaimMap;
use super::cluster::Cluster;
use super::ValidationParams;

/// Per-source breakdown, kept for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAgreement {
    pub trust: f64,
    pub agreement: f64,
    pub shared_topics: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Corroboration {
    pub score: f64,
    pub distinct_source_count: usize,
    pub per_source: BTreeMap<String, SourceAgreement>,
}

impl Corroboration {
    pub fn meets_minimum(&self, params: &ValidationParams) -> bool {
        self.distinct_source_count >= params.min_distinct_sources
    }
}

/// Trust of each distinct source in the cluster (max over its items).
pub fn source_trust(cluster: &Cluster) -> BTreeMap<String, f64> {
    let mut out: BTreeMap<String, f64> = BTreeMap::new();
    for item in &cluster.items {
        let w = out.entry(item.source_id.clone()).or_insert(0.0);
        if item.source_trust_weight > *w {
            *w = item.source_trust_weight;
        }
    }
    out
}

/// Score a cluster using an already built claim map.
pub fn corroboration(cluster: &Cluster, claims: &ClaimMap, params: &ValidationParams) -> Corroboration {
    let trust = source_trust(cluster);
    let distinct_source_count = trust.len();

    // (agreeing, shared) per source
    let mut tally: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for topic in claims.shared_topics() {
        let Some(majority) = topic.majority() else {
            continue;
        };
        for (source, stance) in &topic.stances {
            let entry = tally.entry(source.as_str()).or_insert((0, 0));
            entry.1 += 1;
            if stance.compatible_with(majority) {
                entry.0 += 1;
            }
        }
    }

    let mut per_source = BTreeMap::new();
    let mut weighted = 0.0f64;
    let mut total = 0.0f64;
    for (source, &w) in &trust {
        let (agreeing, shared) = tally.get(source.as_str()).copied().unwrap_or((0, 0));
        let agreement = if shared == 0 {
            params.orthogonal_agreement
        } else {
            agreeing as f64 / shared as f64
        };
        weighted += w * agreement;
        total += w;
        per_source.insert(
            source.clone(),
            SourceAgreement {
                trust: w,
                agreement,
                shared_topics: shared,
            },
        );
    }

    let score = if distinct_source_count < params.min_distinct_sources || total <= 0.0 {
        0.0
    } else {
        (weighted / total).clamp(0.0, 1.0)
    };

    Corroboration {
        score,
        distinct_source_count,
        per_source,
    }
}
