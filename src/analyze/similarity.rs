// src/analyze/similarity.rs
//! Text similarity used for clustering and paraphrase matching.
//!
//! Every measure here is symmetric (`sim(a, b) == sim(b, a)`) and deterministic.
//! - Token Jaccard over lowercase word tokens (Hangul, Latin and digits).
//! - Title similarity: `strsim::normalized_levenshtein` (f64).
//!
//! Item similarity is the max of both, so a short rewritten headline or a long
//! body with shared vocabulary can each link two reports of one event.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

use crate::ingest::types::RawItem;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "had", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will",
    "with", "said", "says",
];

fn token_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\p{N}+(?:[.,]\p{N}+)*|[\p{L}\p{N}]+").expect("token regex"))
}

/// Lowercase word tokens in text order, stopwords included.
pub fn raw_tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_re()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Content tokens: no stopwords, no single Latin letters.
pub fn tokens(text: &str) -> BTreeSet<String> {
    raw_tokens(text)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .filter(|t| t.chars().count() > 1 || !t.is_ascii())
        .collect()
}

/// |a ∩ b| / |a ∪ b|; 0 when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Case-insensitive normalized Levenshtein similarity in [0, 1].
pub fn title_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Precomputed per-item features, so pairwise comparison does not re-tokenize.
#[derive(Debug, Clone)]
pub struct ItemProfile {
    pub tokens: BTreeSet<String>,
    pub title: String,
}

impl ItemProfile {
    pub fn of(item: &RawItem) -> Self {
        Self {
            tokens: tokens(&item.full_text()),
            title: item.title.to_lowercase(),
        }
    }

    pub fn similarity(&self, other: &ItemProfile) -> f64 {
        let j = jaccard(&self.tokens, &other.tokens);
        let t = normalized_levenshtein(&self.title, &other.title);
        j.max(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn tokens_handle_hangul_digits_and_stopwords() {
        let t = tokens("The 국회 passed a 3.5% budget, said Yonhap.");
        assert_eq!(t, set(&["3.5", "budget", "passed", "yonhap", "국회"]));
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded() {
        let a = set(&["x", "y", "z"]);
        let b = set(&["y", "z", "w", "v"]);
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        assert!((jaccard(&a, &b) - 2.0 / 5.0).abs() < 1e-12);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn title_similarity_is_symmetric() {
        let a = "Parliament passes budget bill";
        let b = "parliament passes the budget";
        assert_eq!(title_similarity(a, b), title_similarity(b, a));
        assert_eq!(title_similarity(a, a), 1.0);
    }
}
