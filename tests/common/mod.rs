// tests/common/mod.rs
// Shared builders for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use kona_newsroom::analyze::ValidatedStory;
use kona_newsroom::artifacts::{ArtifactSink, MemoryArtifactStore, PublishedArticle};
use kona_newsroom::config::{PipelineConfig, ProviderKind, ProviderSettings};
use kona_newsroom::generate::{DynProvider, GenerationProvider, GenerationRequest, MockProvider};
use kona_newsroom::ingest::types::FeedEntry;
use kona_newsroom::publish::{MemoryLedger, PublicationLedger};
use kona_newsroom::source_weights::SourceWeightsConfig;
use kona_newsroom::RunContext;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()
}

pub fn run_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn weights() -> SourceWeightsConfig {
    SourceWeightsConfig::from_json_str(
        r#"{"default_weight":0.5,"weights":{"alpha":0.9,"bravo":0.7,"charlie":0.5}}"#,
    )
    .unwrap()
}

pub fn entry(source: &str, slug: &str, title: &str, body: &str, minutes: i64) -> FeedEntry {
    let at = base_time() + chrono::Duration::minutes(minutes);
    FeedEntry {
        locator: format!("{source}#{slug}"),
        source: Some(source.to_string()),
        title: Some(title.to_string()),
        link: Some(format!("https://{source}.example/news/{slug}")),
        body: Some(body.to_string()),
        published: Some(at.to_rfc3339()),
    }
}

/// Four unrelated events, each reported identically by alpha and bravo, one
/// hour apart so their priority order is fixed.
pub fn four_stories() -> Vec<FeedEntry> {
    let topics = [
        ("typhoon", "Typhoon Khanun hits Busan port", "Typhoon Khanun forced closure of Busan port terminals."),
        ("budget", "Parliament passes housing budget", "National Assembly approved housing budget of 12 trillion."),
        ("phone", "Samsung unveils foldable phone", "Samsung Electronics unveiled new foldable smartphone in Seoul."),
        ("strike", "Subway strike ends after deal", "Subway union reached wage agreement with transit operator."),
    ];
    let mut out = Vec::new();
    for (i, (slug, title, body)) in topics.iter().enumerate() {
        let t = i as i64 * 60;
        out.push(entry("alpha", slug, title, body, t));
        out.push(entry("bravo", slug, title, body, t + 10));
    }
    out
}

pub fn test_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.providers = vec![ProviderKind::Mock];
    cfg.mock_mode = true;
    cfg.feeds = Vec::new();
    cfg.provider = ProviderSettings {
        timeout: Duration::from_secs(5),
        max_retries: 1,
        backoff_base: Duration::from_millis(1),
        concurrency: 2,
        calls_per_minute: 1000,
    };
    cfg
}

pub fn context(
    cfg: PipelineConfig,
    providers: Vec<DynProvider>,
    ledger: Arc<dyn PublicationLedger>,
) -> (RunContext, Arc<MemoryArtifactStore>) {
    let store = Arc::new(MemoryArtifactStore::new());
    let artifacts: Arc<dyn ArtifactSink> = store.clone();
    let ctx = RunContext {
        config: cfg,
        weights: weights(),
        sources: Vec::new(),
        providers,
        ledger,
        artifacts,
        started_at: run_start(),
    };
    (ctx, store)
}

pub fn mock_context() -> (RunContext, Arc<MemoryArtifactStore>) {
    context(
        test_config(),
        vec![Arc::new(MockProvider) as DynProvider],
        Arc::new(MemoryLedger::new()),
    )
}

/// Provider that records every call and either always fails or always
/// answers with an article naming the story.
pub struct Scripted {
    pub name: &'static str,
    pub fail: bool,
    pub calls: parking_lot::Mutex<Vec<String>>,
}

impl Scripted {
    pub fn ok(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: false,
            calls: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: true,
            calls: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl GenerationProvider for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, req: &GenerationRequest) -> anyhow::Result<String> {
        self.calls.lock().push(req.story_id.clone());
        if self.fail {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(serde_json::json!({
            "title": format!("Story {}", req.story_id),
            "content": format!("Article about story {} written by {}.", req.story_id, self.name),
        })
        .to_string())
    }
}

/// Never answers.
pub struct Hanging;

#[async_trait]
impl GenerationProvider for Hanging {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, _req: &GenerationRequest) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        anyhow::bail!("unreachable in tests")
    }
}

/// Answers every story with the same article after `delay`, tracking how many
/// calls run at once.
pub struct Steady {
    pub delay: Duration,
    pub same_text: bool,
    pub calls: AtomicUsize,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl Steady {
    pub fn new(delay: Duration, same_text: bool) -> Arc<Self> {
        Arc::new(Self {
            delay,
            same_text,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerationProvider for Steady {
    fn name(&self) -> &str {
        "steady"
    }

    async fn generate(&self, req: &GenerationRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        let content = if self.same_text {
            "Officials confirmed the event on Wednesday.".to_string()
        } else {
            format!("Officials confirmed story {} on Wednesday.", req.story_id)
        };
        Ok(serde_json::json!({ "title": "Update", "content": content }).to_string())
    }
}

/// Panics inside the story task.
pub struct Exploding;

#[async_trait]
impl GenerationProvider for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    async fn generate(&self, _req: &GenerationRequest) -> anyhow::Result<String> {
        panic!("provider blew up")
    }
}

/// Artifact sink whose article writes take `delay`.
pub struct SlowArtifacts {
    pub delay: Duration,
    pub inner: MemoryArtifactStore,
}

#[async_trait]
impl ArtifactSink for SlowArtifacts {
    async fn store_stories(&self, stories: &[ValidatedStory]) -> anyhow::Result<()> {
        self.inner.store_stories(stories).await
    }

    async fn store_article(&self, article: &PublishedArticle) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.store_article(article).await
    }
}
