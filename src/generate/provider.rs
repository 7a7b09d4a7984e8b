// src/generate/provider.rs
//! Language-model providers behind one async trait.
//!
//! Providers are built from the ordered `AI_MODEL` list; the orchestrator only
//! ever sees `Arc<dyn GenerationProvider>`.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::prompt::GenerationRequest;
use crate::config::{PipelineConfig, ProviderKind};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLAUDE_MODEL: &str = "claude-3-5-sonnet-latest";

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o-mini";

const TEMPERATURE: f32 = 0.7;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Raw model output for one request. Parsing happens in the orchestrator.
    async fn generate(&self, req: &GenerationRequest) -> Result<String>;
}

pub type DynProvider = Arc<dyn GenerationProvider>;

// ------------------------------------------------------------
// Claude (Anthropic Messages API)
// ------------------------------------------------------------

pub struct ClaudeProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: CLAUDE_MODEL.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeBlock>,
}

#[derive(Deserialize)]
struct ClaudeBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl GenerationProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String> {
        let url = format!("{}/messages", self.base_url);
        debug!(target: "generate", model = %self.model, story_id = %req.story_id, "claude request");

        let body = ClaudeRequest {
            model: &self.model,
            max_tokens: req.max_tokens,
            temperature: TEMPERATURE,
            system: &req.system,
            messages: vec![ClaudeMessage {
                role: "user",
                content: &req.prompt,
            }],
        };
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .context("claude request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Claude API error ({status}): {error_text}"));
        }

        let parsed: ClaudeResponse = response.json().await.context("claude response body")?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}

// ------------------------------------------------------------
// OpenAI (Chat Completions)
// ------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: OPENAI_API_URL.to_string(),
            model: OPENAI_MODEL.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMsg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String> {
        debug!(target: "generate", model = %self.model, story_id = %req.story_id, "openai request");
        let body = ChatReq {
            model: &self.model,
            messages: vec![
                ChatMsg {
                    role: "system",
                    content: &req.system,
                },
                ChatMsg {
                    role: "user",
                    content: &req.prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: req.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error ({status}): {error_text}"));
        }

        let parsed: ChatResp = response.json().await.context("openai response body")?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

// ------------------------------------------------------------
// Mock (AI_TEST_MODE=mock)
// ------------------------------------------------------------

/// Deterministic offline provider: echoes the verified facts back as the
/// article body.
#[derive(Debug, Clone, Default)]
pub struct MockProvider;

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String> {
        let headline = req
            .prompt
            .lines()
            .find_map(|l| l.strip_prefix("Headline: "))
            .unwrap_or("KONA")
            .to_string();
        let facts: Vec<&str> = req
            .prompt
            .lines()
            .skip_while(|l| !l.starts_with("VERIFIED FACTS"))
            .skip(1)
            .take_while(|l| l.starts_with("- "))
            .map(|l| l.trim_start_matches("- "))
            .collect();
        let content = format!("[{}] {}", req.story_id, facts.join(" "));
        Ok(serde_json::json!({ "title": headline, "content": content }).to_string())
    }
}

/// Build providers for the usable entries of the configured preference list.
/// Entries without credentials are skipped with a warning.
pub fn build_providers(cfg: &PipelineConfig, http: &reqwest::Client) -> Vec<DynProvider> {
    let mut out: Vec<DynProvider> = Vec::new();
    for kind in &cfg.providers {
        match kind {
            ProviderKind::Mock if cfg.mock_mode => out.push(Arc::new(MockProvider)),
            ProviderKind::Mock => {
                warn!(target: "generate", "mock provider listed but AI_TEST_MODE is not mock")
            }
            ProviderKind::Claude | ProviderKind::OpenAi => match cfg.credential_for(*kind) {
                Some(key) if *kind == ProviderKind::Claude => {
                    out.push(Arc::new(ClaudeProvider::new(key, http.clone())))
                }
                Some(key) => out.push(Arc::new(OpenAiProvider::new(key, http.clone()))),
                None => {
                    warn!(target: "generate", provider = kind.as_str(), "no credential, provider skipped")
                }
            },
        }
    }
    out
}
