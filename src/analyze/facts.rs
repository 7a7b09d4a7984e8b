// src/analyze/facts.rs
//! Consensus fact synthesis.
//!
//! Only the trust-weighted majority variant of a topic can become a consensus
//! fact, so two conflicting versions never both reach the generator. It needs
//! at least `min_distinct_sources` supporters, and no conflicting source may be
//! as trusted as the most trusted source stating that exact variant. Vague
//! stances count as supporters but never shield a figure from dissent.
//! Everything else is a divergent claim, kept with its supporters and
//! contradictors so the generator can flag it.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeSet;

use super::claims::{Claim, ClaimMap, Topic};
use super::ValidationParams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub statement: String,
    pub supporting_source_ids: BTreeSet<String>,
    /// Sources asserting a conflicting version. Empty for consensus facts.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub contradicting_source_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSet {
    pub consensus: Vec<Fact>,
    pub divergent: Vec<Fact>,
}

fn same_variant(a: &Claim, b: &Claim) -> bool {
    a.negated == b.negated && a.numbers == b.numbers
}

/// Wording for a variant: the most trusted stance stating exactly that variant.
fn statement_for(topic: &Topic, variant: &Claim) -> String {
    topic
        .stances
        .values()
        .filter(|c| same_variant(c, variant))
        .max_by(|a, b| {
            a.trust
                .total_cmp(&b.trust)
                .then_with(|| b.source_id.cmp(&a.source_id))
        })
        .map(|c| c.text.clone())
        .unwrap_or_else(|| variant.text.clone())
}

pub fn synthesize(claims: &ClaimMap, params: &ValidationParams) -> FactSet {
    let mut consensus = Vec::new();
    let mut divergent = Vec::new();

    for topic in &claims.topics {
        let majority = topic.majority();
        for variant in topic.variants() {
            let supporters: Vec<&Claim> = topic.supporters(variant).collect();
            let contradictors: Vec<&Claim> = topic.contradictors(variant).collect();
            let top_trust = supporters
                .iter()
                .filter(|c| same_variant(c, variant))
                .map(|c| c.trust)
                .fold(f64::NEG_INFINITY, f64::max);
            let overruled = contradictors.iter().any(|c| c.trust >= top_trust);
            let is_majority = majority.is_some_and(|m| std::ptr::eq(m, variant));

            let fact = Fact {
                statement: statement_for(topic, variant),
                supporting_source_ids: supporters.iter().map(|c| c.source_id.clone()).collect(),
                contradicting_source_ids: contradictors
                    .iter()
                    .map(|c| c.source_id.clone())
                    .collect(),
            };
            if is_majority && supporters.len() >= params.min_distinct_sources && !overruled {
                consensus.push(Fact {
                    contradicting_source_ids: BTreeSet::new(),
                    ..fact
                });
            } else {
                divergent.push(fact);
            }
        }
    }

    FactSet {
        consensus: ordered(consensus),
        divergent: ordered(divergent),
    }
}

/// Best-supported first, then by wording; duplicate wordings collapse.
fn ordered(mut facts: Vec<Fact>) -> Vec<Fact> {
    facts.sort_by(|a, b| {
        (Reverse(a.supporting_source_ids.len()), &a.statement)
            .cmp(&(Reverse(b.supporting_source_ids.len()), &b.statement))
    });
    let mut seen = BTreeSet::new();
    facts.retain(|f| seen.insert(f.statement.clone()));
    facts
}
