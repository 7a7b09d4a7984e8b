// src/generate/mod.rs
//! Generation orchestration.
//!
//! Providers are tried in preference order. Each call is bounded by a timeout
//! and goes through the provider's rate limiter. A failed or malformed
//! response is retried on the same provider with exponential backoff
//! (`base * 2^attempt`); after `max_retries` retries the next provider is
//! tried. Only when every provider is exhausted does the story fail.

pub mod budget;
pub mod limiter;
pub mod prompt;
pub mod provider;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyze::ValidatedStory;
use crate::config::ProviderSettings;
use crate::publish::content_hash;

pub use budget::{ArticleBudget, BudgetSlot};
pub use limiter::RateLimiter;
pub use prompt::{parse_article_response, ArticleDraft, GenerationRequest};
pub use provider::{
    build_providers, ClaudeProvider, DynProvider, GenerationProvider, MockProvider, OpenAiProvider,
};

/// One generated article. Never edited; a regeneration is a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArticle {
    pub story_id: String,
    pub title: String,
    pub text: String,
    pub provider_used: String,
    /// 1-based count of provider calls made for this story, across providers.
    pub attempt_number: u32,
    pub generated_at: DateTime<Utc>,
    pub content_hash: String,
    /// Consensus statements handed to the model as grounding.
    pub grounding: Vec<String>,
}

/// Every provider was exhausted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("all providers exhausted after {attempts} attempt(s): {last_error}")]
pub struct GenerationFailure {
    pub attempts: u32,
    pub last_error: String,
}

struct ProviderSlot {
    provider: DynProvider,
    limiter: RateLimiter,
}

pub struct Orchestrator {
    slots: Vec<ProviderSlot>,
    settings: ProviderSettings,
}

impl Orchestrator {
    pub fn new(providers: Vec<DynProvider>, settings: ProviderSettings) -> Self {
        let slots = providers
            .into_iter()
            .map(|provider| ProviderSlot {
                provider,
                limiter: RateLimiter::new(settings.concurrency, settings.calls_per_minute),
            })
            .collect();
        Self { slots, settings }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.provider.name().to_string()).collect()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Produce at most one article for `story`.
    pub async fn generate(&self, story: &ValidatedStory) -> Result<GeneratedArticle, GenerationFailure> {
        let request = GenerationRequest::for_story(story);
        let mut calls = 0u32;
        let mut last_error = String::from("no provider configured");

        for slot in &self.slots {
            let name = slot.provider.name().to_string();
            for attempt in 0..=self.settings.max_retries {
                calls += 1;
                counter!("generation_attempts_total", "provider" => name.clone()).increment(1);

                let result = match slot.limiter.acquire().await {
                    Ok(_permit) => {
                        let t0 = Instant::now();
                        let r = tokio::time::timeout(self.settings.timeout, slot.provider.generate(&request)).await;
                        histogram!("generation_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                        match r {
                            Ok(Ok(raw)) => parse_article_response(&raw),
                            Ok(Err(e)) => Err(e),
                            Err(_) => Err(anyhow::anyhow!(
                                "timed out after {}s",
                                self.settings.timeout.as_secs_f64()
                            )),
                        }
                    }
                    Err(e) => Err(e),
                };

                match result {
                    Ok(draft) => {
                        info!(
                            target: "generate",
                            story_id = %story.cluster_id,
                            provider = %name,
                            attempt = calls,
                            "article generated"
                        );
                        return Ok(GeneratedArticle {
                            story_id: story.cluster_id.clone(),
                            content_hash: content_hash(&draft.content),
                            title: draft.title,
                            text: draft.content,
                            provider_used: name,
                            attempt_number: calls,
                            generated_at: Utc::now(),
                            grounding: story
                                .consensus_facts
                                .iter()
                                .map(|f| f.statement.clone())
                                .collect(),
                        });
                    }
                    Err(e) => {
                        counter!("generation_failures_total", "provider" => name.clone()).increment(1);
                        warn!(
                            target: "generate",
                            story_id = %story.cluster_id,
                            provider = %name,
                            attempt = attempt + 1,
                            error = %e,
                            "generation attempt failed"
                        );
                        last_error = format!("{name}: {e:#}");
                        if attempt < self.settings.max_retries {
                            tokio::time::sleep(self.backoff(attempt)).await;
                        }
                    }
                }
            }
        }

        Err(GenerationFailure {
            attempts: calls,
            last_error,
        })
    }
}
