// src/analyze/claims.rs
//! Claim extraction and cross-source comparison.
//!
//! Every sentence of an item (headline included) is a claim. A claim is reduced
//! to a *skeleton* (content tokens without negations and numbers), its polarity
//! and its number set. Claims whose skeletons are paraphrases form a topic.
//! Inside a topic each source takes one stance; stances conflict when their
//! polarity differs or when both carry numbers and the numbers differ.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use strsim::normalized_levenshtein;

use crate::analyze::cluster::Cluster;
use crate::analyze::similarity::{is_stopword, jaccard, raw_tokens};

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nor", "deny", "denies", "denied", "didn", "doesn", "isn",
    "wasn", "weren", "aren", "won", "cannot", "hasn", "haven",
];
const KOREAN_NEGATION_MARKERS: &[&str] = &["않", "아니", "못", "없"];

/// Claims with fewer skeleton tokens carry no checkable content.
const MIN_SKELETON_TOKENS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub source_id: String,
    pub trust: f64,
    pub text: String,
    pub skeleton: BTreeSet<String>,
    pub negated: bool,
    pub numbers: BTreeSet<String>,
}

impl Claim {
    pub fn parse(source_id: &str, trust: f64, sentence: &str) -> Option<Claim> {
        let mut skeleton = BTreeSet::new();
        let mut numbers = BTreeSet::new();
        let mut negations = 0usize;
        for tok in raw_tokens(sentence) {
            if tok.chars().all(|c| c.is_numeric() || c == '.' || c == ',') {
                numbers.insert(tok);
            } else if is_negation(&tok) {
                negations += 1;
            } else if !is_stopword(&tok) && (tok.chars().count() > 1 || !tok.is_ascii()) {
                skeleton.insert(tok);
            }
        }
        if skeleton.len() < MIN_SKELETON_TOKENS {
            return None;
        }
        Some(Claim {
            source_id: source_id.to_string(),
            trust,
            text: sentence.trim().to_string(),
            skeleton,
            negated: negations % 2 == 1,
            numbers,
        })
    }

    /// Whether two claims about the same topic can both be true.
    pub fn compatible_with(&self, other: &Claim) -> bool {
        self.negated == other.negated
            && (self.numbers.is_empty() || other.numbers.is_empty() || self.numbers == other.numbers)
    }

    fn skeleton_text(&self) -> String {
        self.skeleton.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

fn is_negation(tok: &str) -> bool {
    NEGATIONS.contains(&tok) || KOREAN_NEGATION_MARKERS.iter().any(|m| tok.contains(m))
}

/// Split text into sentences on terminal punctuation and line breaks.
pub fn split_sentences(text: &str) -> Vec<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"[.!?。]+(?:\s+|$)|\n+").expect("sentence regex"));
    re.split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Paraphrase test on skeletons; symmetric.
pub fn same_topic(a: &Claim, b: &Claim, threshold: f64) -> bool {
    if jaccard(&a.skeleton, &b.skeleton) >= threshold {
        return true;
    }
    normalized_levenshtein(&a.skeleton_text(), &b.skeleton_text()) >= threshold
}

/// One statement as discussed by the cluster's sources.
#[derive(Debug, Clone)]
pub struct Topic {
    /// One stance per source: its most specific claim on the topic.
    pub stances: BTreeMap<String, Claim>,
}

impl Topic {
    pub fn source_count(&self) -> usize {
        self.stances.len()
    }

    /// Distinct positions taken on the topic. A stance without numbers only forms
    /// its own variant when no same-polarity stance is more specific.
    pub fn variants(&self) -> Vec<&Claim> {
        let mut out: Vec<&Claim> = Vec::new();
        let mut specific: Vec<&Claim> = self
            .stances
            .values()
            .filter(|c| !c.numbers.is_empty())
            .collect();
        specific.sort_by(|a, b| variant_key(a).cmp(&variant_key(b)).then_with(|| a.text.cmp(&b.text)));
        for c in specific {
            if !out.iter().any(|v| variant_key(v) == variant_key(c)) {
                out.push(c);
            }
        }
        for polarity in [false, true] {
            let vague: Vec<&Claim> = self
                .stances
                .values()
                .filter(|c| c.negated == polarity && c.numbers.is_empty())
                .collect();
            if let Some(first) = vague.first() {
                if !out.iter().any(|v| v.negated == polarity) {
                    out.push(*first);
                }
            }
        }
        out
    }

    /// Sources whose stance is compatible with `variant`.
    pub fn supporters<'a>(&'a self, variant: &Claim) -> impl Iterator<Item = &'a Claim> + 'a {
        let variant = variant.clone();
        self.stances.values().filter(move |c| c.compatible_with(&variant))
    }

    /// Sources whose stance conflicts with `variant`.
    pub fn contradictors<'a>(&'a self, variant: &Claim) -> impl Iterator<Item = &'a Claim> + 'a {
        let variant = variant.clone();
        self.stances.values().filter(move |c| !c.compatible_with(&variant))
    }

    /// Trust-weighted majority variant. Ties: more supporters, then variant key, then text.
    pub fn majority(&self) -> Option<&Claim> {
        let mut best: Option<(&Claim, f64, usize)> = None;
        for v in self.variants() {
            let (mass, count) = self
                .supporters(v)
                .fold((0.0f64, 0usize), |(m, n), c| (m + c.trust, n + 1));
            let better = match best {
                None => true,
                Some((b, bm, bn)) => {
                    mass > bm
                        || (mass == bm && count > bn)
                        || (mass == bm
                            && count == bn
                            && (variant_key(v), &v.text) < (variant_key(b), &b.text))
                }
            };
            if better {
                best = Some((v, mass, count));
            }
        }
        best.map(|(v, _, _)| v)
    }
}

fn variant_key(c: &Claim) -> (bool, Vec<&str>) {
    (c.negated, c.numbers.iter().map(String::as_str).collect())
}

/// All topics of a cluster.
#[derive(Debug, Clone, Default)]
pub struct ClaimMap {
    pub topics: Vec<Topic>,
}

impl ClaimMap {
    /// Extract claims from every member and group them into topics.
    ///
    /// Claims are visited in (source_id, text) order and each joins the first
    /// topic holding a paraphrase, so the map is a pure function of membership.
    pub fn build(cluster: &Cluster, paraphrase_threshold: f64) -> Self {
        let mut claims: Vec<Claim> = Vec::new();
        for item in &cluster.items {
            for sentence in split_sentences(&item.full_text()) {
                if let Some(c) = Claim::parse(&item.source_id, item.source_trust_weight, &sentence) {
                    claims.push(c);
                }
            }
        }
        claims.sort_by(|a, b| (&a.source_id, &a.text).cmp(&(&b.source_id, &b.text)));
        claims.dedup_by(|a, b| a.source_id == b.source_id && a.text == b.text);

        let mut grouped: Vec<Vec<Claim>> = Vec::new();
        for claim in claims {
            match grouped
                .iter_mut()
                .find(|g| g.iter().any(|c| same_topic(c, &claim, paraphrase_threshold)))
            {
                Some(g) => g.push(claim),
                None => grouped.push(vec![claim]),
            }
        }

        let topics = grouped
            .into_iter()
            .map(|group| {
                let mut stances: BTreeMap<String, Claim> = BTreeMap::new();
                for c in group {
                    let replace = match stances.get(&c.source_id) {
                        None => true,
                        // Most specific wins: more numbers, then more trust, then shorter text.
                        Some(prev) => {
                            (c.numbers.len(), c.trust) > (prev.numbers.len(), prev.trust)
                                || ((c.numbers.len(), c.trust) == (prev.numbers.len(), prev.trust)
                                    && c.text.len() < prev.text.len())
                        }
                    };
                    if replace {
                        stances.insert(c.source_id.clone(), c);
                    }
                }
                Topic { stances }
            })
            .collect();

        Self { topics }
    }

    /// Topics that more than one source speaks to.
    pub fn shared_topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter().filter(|t| t.source_count() > 1)
    }
}
