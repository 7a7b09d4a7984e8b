// src/generate/prompt.rs
//! Prompt construction and response parsing.
//!
//! Consensus facts are the only grounding handed to the model. Divergent
//! claims are listed in a separate section marked as unverified, so the model
//! can mention the uncertainty without stating them as fact.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt::Write as _;

use crate::analyze::ValidatedStory;

pub const SYSTEM_PROMPT: &str = "You are a neutral news writer for KONA, a Korean news digest. \
Write in the language of the facts you are given (Korean when they are Korean). \
Use ONLY the verified facts as statements of fact. Claims marked UNVERIFIED may be \
mentioned only as uncertain reports, attributed to their sources, never as fact. \
Do not add information that is not in the input. \
Respond with a single JSON object: {\"title\": string, \"content\": string}.";

const MAX_TOKENS: u32 = 2000;

/// Everything a provider needs for one call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub story_id: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn for_story(story: &ValidatedStory) -> Self {
        Self {
            story_id: story.cluster_id.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(story),
            max_tokens: MAX_TOKENS,
        }
    }
}

pub fn build_prompt(story: &ValidatedStory) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Headline: {}", story.headline);
    let _ = writeln!(
        out,
        "Corroborated by {} independent sources.\n",
        story.distinct_source_count
    );

    out.push_str("VERIFIED FACTS (the only statements you may present as fact):\n");
    for fact in &story.consensus_facts {
        let sources: Vec<&str> = fact.supporting_source_ids.iter().map(String::as_str).collect();
        let _ = writeln!(out, "- {} [{}]", fact.statement, sources.join(", "));
    }

    if !story.divergent_claims.is_empty() {
        out.push_str("\nUNVERIFIED CLAIMS (do not state as fact; mention only as uncertain):\n");
        for claim in &story.divergent_claims {
            let sources: Vec<&str> = claim.supporting_source_ids.iter().map(String::as_str).collect();
            let _ = write!(out, "- {} (reported by {}", claim.statement, sources.join(", "));
            if !claim.contradicting_source_ids.is_empty() {
                let against: Vec<&str> =
                    claim.contradicting_source_ids.iter().map(String::as_str).collect();
                let _ = write!(out, "; disputed by {}", against.join(", "));
            }
            out.push_str(")\n");
        }
    }

    if !story.source_urls.is_empty() {
        out.push_str("\nSources:\n");
        for url in &story.source_urls {
            let _ = writeln!(out, "- {url}");
        }
    }
    out.push_str("\nReturn only the JSON object.");
    out
}

/// Parsed model output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
}

/// Accepts a bare JSON object or one wrapped in a ```json fence. Empty title
/// or content counts as malformed.
pub fn parse_article_response(raw: &str) -> Result<ArticleDraft> {
    let body = strip_fence(raw);
    if body.is_empty() {
        bail!("empty response");
    }
    let draft: ArticleDraft = serde_json::from_str(body).context("response is not article JSON")?;
    let draft = ArticleDraft {
        title: draft.title.trim().to_string(),
        content: draft.content.trim().to_string(),
    };
    if draft.title.is_empty() || draft.content.is_empty() {
        bail!("response has empty title or content");
    }
    Ok(draft)
}

fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip the language tag line (```json).
    let after = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}
