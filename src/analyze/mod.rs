// src/analyze/mod.rs
//! Cross-validation stage: cluster normalized items into stories, score how
//! well the sources corroborate each other and split their claims into
//! consensus facts and divergent claims.

pub mod claims;
pub mod cluster;
pub mod facts;
pub mod scoring;
pub mod similarity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ConfigError;

pub use crate::analyze::claims::ClaimMap;
pub use crate::analyze::cluster::{cluster_id_for, cluster_items, Cluster};
pub use crate::analyze::facts::{Fact, FactSet};
pub use crate::analyze::scoring::{Corroboration, SourceAgreement};

/// Thresholds shared by clustering, scoring and synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationParams {
    /// Item similarity needed to join a cluster.
    pub similarity_threshold: f64,
    /// Clustering time window W, in seconds.
    pub window_secs: i64,
    pub min_distinct_sources: usize,
    pub min_corroboration_score: f64,
    /// Skeleton similarity for two claims to count as the same statement.
    pub paraphrase_threshold: f64,
    /// Agreement credited to a source that shares no statement with the others.
    pub orthogonal_agreement: f64,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.45,
            window_secs: 24 * 3600,
            min_distinct_sources: 2,
            min_corroboration_score: 0.5,
            paraphrase_threshold: 0.6,
            orthogonal_agreement: 0.5,
        }
    }
}

impl ValidationParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |key: &'static str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::invalid(key, v))
            }
        };
        unit("validation.similarity_threshold", self.similarity_threshold)?;
        unit("validation.min_corroboration_score", self.min_corroboration_score)?;
        unit("validation.paraphrase_threshold", self.paraphrase_threshold)?;
        unit("validation.orthogonal_agreement", self.orthogonal_agreement)?;
        if self.window_secs <= 0 {
            return Err(ConfigError::invalid("validation.window_secs", self.window_secs));
        }
        // Single-source stories are never publishable.
        if self.min_distinct_sources < 2 {
            return Err(ConfigError::invalid(
                "validation.min_distinct_sources",
                self.min_distinct_sources,
            ));
        }
        Ok(())
    }
}

/// Why a story was not cleared for generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HoldReason {
    TooFewSources { found: usize, required: usize },
    LowScore { score: f64, required: f64 },
    NoConsensus,
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldReason::TooFewSources { found, required } => {
                write!(f, "{found} distinct source(s), {required} required")
            }
            HoldReason::LowScore { score, required } => {
                write!(f, "corroboration score {score:.3} below {required:.3}")
            }
            HoldReason::NoConsensus => write!(f, "no statement is corroborated"),
        }
    }
}

/// A scored cluster, ready for (or held from) generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedStory {
    pub cluster_id: String,
    pub headline: String,
    pub corroboration_score: f64,
    pub consensus_facts: Vec<Fact>,
    pub divergent_claims: Vec<Fact>,
    pub distinct_source_count: usize,
    pub earliest_published_at: DateTime<Utc>,
    pub source_urls: Vec<String>,
    #[serde(default)]
    pub per_source: BTreeMap<String, SourceAgreement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_reason: Option<HoldReason>,
}

impl ValidatedStory {
    pub fn is_publishable(&self) -> bool {
        self.hold_reason.is_none()
    }
}

/// Score one cluster. Pure: same membership, same result.
pub fn validate_cluster(cluster: &Cluster, params: &ValidationParams) -> ValidatedStory {
    let claims = ClaimMap::build(cluster, params.paraphrase_threshold);
    let corroboration = scoring::corroboration(cluster, &claims, params);
    let facts = facts::synthesize(&claims, params);

    let hold_reason = if !corroboration.meets_minimum(params) {
        Some(HoldReason::TooFewSources {
            found: corroboration.distinct_source_count,
            required: params.min_distinct_sources,
        })
    } else if corroboration.score < params.min_corroboration_score {
        Some(HoldReason::LowScore {
            score: corroboration.score,
            required: params.min_corroboration_score,
        })
    } else if facts.consensus.is_empty() {
        Some(HoldReason::NoConsensus)
    } else {
        None
    };

    let rep = cluster.representative();
    let mut source_urls: Vec<String> = cluster.items.iter().map(|i| i.canonical_url.clone()).collect();
    source_urls.dedup();

    debug!(
        target: "validate",
        cluster = %cluster.cluster_id,
        score = corroboration.score,
        sources = corroboration.distinct_source_count,
        consensus = facts.consensus.len(),
        divergent = facts.divergent.len(),
        "cluster scored"
    );

    ValidatedStory {
        cluster_id: cluster.cluster_id.clone(),
        headline: rep.title.clone(),
        corroboration_score: corroboration.score,
        consensus_facts: facts.consensus,
        divergent_claims: facts.divergent,
        distinct_source_count: corroboration.distinct_source_count,
        earliest_published_at: cluster.earliest(),
        source_urls,
        per_source: corroboration.per_source,
        hold_reason,
    }
}

/// Score every cluster. Clusters are independent, so large batches are split
/// across scoped threads; output order always follows input order.
pub fn validate_all(clusters: &[Cluster], params: &ValidationParams) -> Vec<ValidatedStory> {
    const PARALLEL_MIN: usize = 16;
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if clusters.len() < PARALLEL_MIN || workers < 2 {
        return clusters.iter().map(|c| validate_cluster(c, params)).collect();
    }
    let chunk = clusters.len().div_ceil(workers);
    std::thread::scope(|s| {
        let handles: Vec<_> = clusters
            .chunks(chunk)
            .map(|part| {
                s.spawn(move || {
                    part.iter()
                        .map(|c| validate_cluster(c, params))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(stories) => stories,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Generation priority: highest score first, then earliest, then id.
pub fn by_priority(a: &ValidatedStory, b: &ValidatedStory) -> std::cmp::Ordering {
    b.corroboration_score
        .total_cmp(&a.corroboration_score)
        .then(a.earliest_published_at.cmp(&b.earliest_published_at))
        .then_with(|| a.cluster_id.cmp(&b.cluster_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawItem;
    use chrono::TimeZone;

    fn item(src: &str, trust: f64, title: &str, body: &str, minute: i64) -> RawItem {
        RawItem {
            source_id: src.into(),
            canonical_url: format!("https://{src}.example/{minute}"),
            title: title.into(),
            body_text: body.into(),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
                + chrono::Duration::minutes(minute),
            source_trust_weight: trust,
        }
    }

    fn cluster(items: Vec<RawItem>) -> Cluster {
        Cluster {
            cluster_id: cluster_id_for(&items[0].canonical_url),
            items,
            window_secs: 86_400,
        }
    }

    #[test]
    fn defaults_are_valid() {
        ValidationParams::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let p = ValidationParams {
            similarity_threshold: 1.5,
            ..ValidationParams::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigError::InvalidValue { key: "validation.similarity_threshold", .. })
        ));
    }

    #[test]
    fn single_source_minimum_is_rejected() {
        for n in [0, 1] {
            let p = ValidationParams {
                min_distinct_sources: n,
                ..ValidationParams::default()
            };
            assert!(matches!(
                p.validate(),
                Err(ConfigError::InvalidValue { key: "validation.min_distinct_sources", .. })
            ));
        }
    }

    #[test]
    fn corroborated_cluster_is_publishable() {
        let body = "Fire kills 5 workers at Incheon plant.";
        let c = cluster(vec![
            item("yonhap", 0.9, "Incheon plant fire", body, 0),
            item("kbs", 0.85, "Incheon plant fire", body, 15),
        ]);
        let story = validate_cluster(&c, &ValidationParams::default());
        assert!(story.is_publishable(), "{:?}", story.hold_reason);
        assert_eq!(story.distinct_source_count, 2);
        assert!(!story.consensus_facts.is_empty());
        assert_eq!(story.headline, "Incheon plant fire");
        assert_eq!(story.source_urls.len(), 2);
    }

    #[test]
    fn single_source_is_held() {
        let c = cluster(vec![item("yonhap", 0.9, "Incheon plant fire", "Fire kills 5 workers.", 0)]);
        let story = validate_cluster(&c, &ValidationParams::default());
        assert_eq!(story.corroboration_score, 0.0);
        assert_eq!(
            story.hold_reason,
            Some(HoldReason::TooFewSources { found: 1, required: 2 })
        );
    }

    #[test]
    fn parallel_and_sequential_validation_agree() {
        let clusters: Vec<Cluster> = (0..40)
            .map(|i| {
                let body = format!("Council approves {i} new parks downtown.");
                cluster(vec![
                    item("a", 0.8, "Parks plan", &body, i),
                    item("b", 0.6, "Parks plan", &body, i + 1),
                ])
            })
            .collect();
        let p = ValidationParams::default();
        let seq: Vec<_> = clusters.iter().map(|c| validate_cluster(c, &p)).collect();
        assert_eq!(validate_all(&clusters, &p), seq);
    }

    #[test]
    fn priority_prefers_score_then_age() {
        let c = cluster(vec![item("a", 0.9, "t", "Fire kills 5 workers.", 0)]);
        let base = validate_cluster(&c, &ValidationParams::default());
        let mut high = base.clone();
        high.corroboration_score = 0.9;
        high.cluster_id = "b".into();
        let mut older = base.clone();
        older.corroboration_score = 0.7;
        older.cluster_id = "c".into();
        let mut newer = older.clone();
        newer.cluster_id = "a".into();
        newer.earliest_published_at = older.earliest_published_at + chrono::Duration::hours(1);
        let mut v = vec![newer, older, high];
        v.sort_by(by_priority);
        let ids: Vec<_> = v.iter().map(|s| s.cluster_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
