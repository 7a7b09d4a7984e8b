//! # Source Weights
//!
//! Configurable mapping from feed sources (e.g. "Yonhap", "KBS", "Google News")
//! to static trust weights in the range `[0.0, 1.0]`.
//!
//! - Loads from JSON config (weights + aliases).
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative spellings and feed titles to canonical sources.
//! - Fallback order: aliases → exact match → longest substring match → default.
//! - The same resolution yields the canonical outlet id used as `source_id`.
//! - Built-in `default_seed()` covers the outlets the collector reads.
//!
//! Weights are read-only for the whole run.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};
use tracing::warn;

/// Configuration for source weights, loaded from JSON or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeightsConfig {
    /// Default weight if no match is found.
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    /// Explicit weights for canonical source names.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Aliases mapping non-canonical names → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    0.50
}

impl Default for SourceWeightsConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceWeightsConfig {
    /// Load configuration from a JSON file.
    /// Falls back to `default_seed()` when the file is missing or invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => Self::from_json_str(&s).unwrap_or_else(|e| {
                warn!(error = %e, path = %path.display(), "invalid source weights, using seed");
                Self::default_seed()
            }),
            Err(_) => Self::default_seed(),
        }
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let raw: SourceWeightsConfig = serde_json::from_str(s)?;
        // Keys are matched against normalized input, so normalize them once here.
        Ok(Self {
            default_weight: raw.default_weight,
            weights: raw
                .weights
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
            aliases: raw
                .aliases
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
        })
    }

    /// Canonical identity of an outlet, used as `source_id` so that one outlet
    /// reached under several names ("Yonhap", "YNA", "연합뉴스") counts once.
    ///
    /// Steps:
    /// 1. Alias lookup (normalized) → canonical name.
    /// 2. Exact weight key.
    /// 3. Substring fallback, longest key first so the result does not depend on
    ///    map iteration order (e.g. "Yonhap News Agency" → "yonhap").
    /// 4. The normalized name itself.
    pub fn canonical_source(&self, source: &str) -> String {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            return normalize(canon);
        }

        if self.weights.contains_key(&s) {
            return s;
        }

        let best = self
            .weights
            .keys()
            .filter(|k| !k.is_empty() && s.contains(k.as_str()))
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| b.cmp(a)));
        match best {
            Some(k) => k.clone(),
            None => s,
        }
    }

    /// Trust weight for a source, resolved through [`canonical_source`](Self::canonical_source).
    /// Unknown outlets get the default weight.
    pub fn weight_for(&self, source: &str) -> f64 {
        let canon = self.canonical_source(source);
        clamp01(self.weights.get(&canon).copied().unwrap_or(self.default_weight))
    }

    /// Built-in seed with Korean and international news outlets.
    pub(crate) fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("yonhap", 0.90),
            ("kbs", 0.85),
            ("mbc", 0.82),
            ("sbs", 0.82),
            ("jtbc", 0.80),
            ("chosun", 0.75),
            ("joongang", 0.75),
            ("donga", 0.75),
            ("hankyoreh", 0.75),
            ("kyunghyang", 0.73),
            ("korea herald", 0.78),
            ("korea times", 0.76),
            ("reuters", 0.90),
            ("associated press", 0.90),
            ("bbc", 0.85),
            ("google news", 0.55),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("yna", "yonhap"),
            ("yonhap news agency", "yonhap"),
            ("연합뉴스", "yonhap"),
            ("google_news_kr", "google news"),
            ("ap", "associated press"),
            ("kbs news", "kbs"),
            ("조선일보", "chosun"),
            ("중앙일보", "joongang"),
            ("동아일보", "donga"),
            ("한겨레", "hankyoreh"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: default_default_weight(),
            weights,
            aliases,
        }
    }
}

/// Normalize a source string: lowercase, separators to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }

    out = out.replace(['\n', '\r', '\t', '.', ',', '’', '\''], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
