// src/config/pipeline.rs
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::analyze::ValidationParams;
use crate::error::ConfigError;

// --- env defaults & names ---
pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

const DEFAULT_MAX_ARTICLES: usize = 5;
const DEFAULT_RUN_BUDGET_SECS: u64 = 600;
/// Upper bounds keep deadline arithmetic finite.
const MAX_RUN_BUDGET_SECS: u64 = 7 * 24 * 3600;
const MAX_PROVIDER_TIMEOUT_SECS: u64 = 3600;
const MAX_PROVIDER_RETRIES: u32 = 20;

/// Language-model backend named in `AI_MODEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Claude,
    OpenAi,
    Mock,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "openai" | "gpt4" | "gpt-4" | "gpt-4.1-nano" => Ok(ProviderKind::OpenAi),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Mock => "mock",
        }
    }
}

/// Provider secrets. Never logged; only their presence is.
#[derive(Clone, Default)]
pub struct Credentials {
    pub claude: Option<String>,
    pub openai: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("claude", &self.claude.as_ref().map(|_| "<set>"))
            .field("openai", &self.openai.as_ref().map(|_| "<set>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    Daily,
    Hourly,
}

/// Knobs for calling external providers.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub concurrency: usize,
    pub calls_per_minute: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            concurrency: 2,
            calls_per_minute: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Rss,
    Snapshot,
}

/// One configured feed collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub kind: FeedKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Fully resolved configuration, built once per run and passed around explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raw `AI_MODEL` value, kept for diagnostics.
    pub ai_model: String,
    /// Ordered provider preference list.
    pub providers: Vec<ProviderKind>,
    pub credentials: Credentials,
    pub mock_mode: bool,
    pub max_articles_per_run: usize,
    pub dry_run: bool,
    pub run_budget: Duration,
    pub provider: ProviderSettings,
    pub validation: ValidationParams,
    pub period: PeriodGranularity,
    pub source_weights_path: PathBuf,
    pub ledger_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub feeds: Vec<FeedSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ai_model: "claude".to_string(),
            providers: vec![ProviderKind::Claude],
            credentials: Credentials::default(),
            mock_mode: false,
            max_articles_per_run: DEFAULT_MAX_ARTICLES,
            dry_run: false,
            run_budget: Duration::from_secs(DEFAULT_RUN_BUDGET_SECS),
            provider: ProviderSettings::default(),
            validation: ValidationParams::default(),
            period: PeriodGranularity::Daily,
            source_weights_path: PathBuf::from("config/source_weights.json"),
            ledger_path: PathBuf::from("state/publications.json"),
            artifacts_dir: PathBuf::from("."),
            feeds: default_feeds(),
        }
    }
}

/// TOML shape. Every field optional; missing ones keep defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    ai_model: Option<String>,
    max_articles_per_run: Option<usize>,
    dry_run: Option<bool>,
    run_budget_secs: Option<u64>,
    period: Option<PeriodGranularity>,
    source_weights_path: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    artifacts_dir: Option<PathBuf>,
    #[serde(default)]
    provider: FileProviderSettings,
    validation: Option<ValidationParams>,
    feeds: Option<Vec<FeedSpec>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileProviderSettings {
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    backoff_ms: Option<u64>,
    concurrency: Option<usize>,
    calls_per_minute: Option<u32>,
}

impl PipelineConfig {
    /// Load using the process environment:
    /// 1) defaults
    /// 2) $PIPELINE_CONFIG_PATH, else config/pipeline.toml (if present)
    /// 3) env overrides
    pub fn load() -> Result<Self, ConfigError> {
        let env = |k: &str| std::env::var(k).ok();
        let path = env(ENV_PIPELINE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH));
        let explicit = env(ENV_PIPELINE_CONFIG_PATH).is_some();
        let mut cfg = if path.exists() || explicit {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env(env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overlaid with a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(s).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;

        let mut cfg = Self::default();
        if let Some(model) = file.ai_model {
            cfg.set_ai_model(&model)?;
        }
        if let Some(n) = file.max_articles_per_run {
            if n == 0 {
                return Err(ConfigError::invalid("max_articles_per_run", n));
            }
            cfg.max_articles_per_run = n;
        }
        if let Some(d) = file.dry_run {
            cfg.dry_run = d;
        }
        if let Some(secs) = file.run_budget_secs {
            cfg.run_budget = Duration::from_secs(secs);
        }
        if let Some(p) = file.period {
            cfg.period = p;
        }
        if let Some(p) = file.source_weights_path {
            cfg.source_weights_path = p;
        }
        if let Some(p) = file.ledger_path {
            cfg.ledger_path = p;
        }
        if let Some(p) = file.artifacts_dir {
            cfg.artifacts_dir = p;
        }
        let fp = file.provider;
        if let Some(s) = fp.timeout_secs {
            cfg.provider.timeout = Duration::from_secs(s);
        }
        if let Some(n) = fp.max_retries {
            cfg.provider.max_retries = n;
        }
        if let Some(ms) = fp.backoff_ms {
            cfg.provider.backoff_base = Duration::from_millis(ms);
        }
        if let Some(n) = fp.concurrency {
            cfg.provider.concurrency = n;
        }
        if let Some(n) = fp.calls_per_minute {
            cfg.provider.calls_per_minute = n;
        }
        if let Some(v) = file.validation {
            cfg.validation = v;
        }
        if let Some(feeds) = file.feeds {
            cfg.feeds = feeds;
        }
        Ok(cfg)
    }

    /// Apply environment overrides through a lookup function (the process env in
    /// production, a map in tests).
    pub fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = env("AI_MODEL") {
            self.set_ai_model(&model)?;
        }
        if let Some(raw) = env("MAX_ARTICLES_PER_RUN") {
            let n: usize = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("MAX_ARTICLES_PER_RUN", &raw))?;
            if n == 0 {
                return Err(ConfigError::invalid("MAX_ARTICLES_PER_RUN", raw));
            }
            self.max_articles_per_run = n;
        }
        if let Some(raw) = env("DRY_RUN") {
            self.dry_run = parse_bool("DRY_RUN", &raw)?;
        }
        if let Some(secs) = parse_num::<u64, _>(&env, "RUN_BUDGET_SECS")? {
            self.run_budget = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_num::<u64, _>(&env, "PROVIDER_TIMEOUT_SECS")? {
            self.provider.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_num(&env, "PROVIDER_MAX_RETRIES")? {
            self.provider.max_retries = n;
        }
        if let Some(ms) = parse_num::<u64, _>(&env, "PROVIDER_BACKOFF_MS")? {
            self.provider.backoff_base = Duration::from_millis(ms);
        }
        if let Some(n) = parse_num(&env, "PROVIDER_CONCURRENCY")? {
            self.provider.concurrency = n;
        }
        if let Some(n) = parse_num(&env, "PROVIDER_CALLS_PER_MINUTE")? {
            self.provider.calls_per_minute = n;
        }
        if let Some(raw) = env("PERIOD") {
            self.period = match raw.trim().to_ascii_lowercase().as_str() {
                "daily" | "day" => PeriodGranularity::Daily,
                "hourly" | "hour" => PeriodGranularity::Hourly,
                _ => return Err(ConfigError::invalid("PERIOD", raw)),
            };
        }
        if let Some(p) = env("LEDGER_PATH") {
            self.ledger_path = PathBuf::from(p);
        }
        if let Some(p) = env("SOURCE_WEIGHTS_PATH") {
            self.source_weights_path = PathBuf::from(p);
        }
        if let Some(p) = env("ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(p);
        }

        self.credentials.claude = non_empty(env("CLAUDE_API_KEY"));
        self.credentials.openai =
            non_empty(env("OPENAI_API_KEY")).or_else(|| non_empty(env("GPT4_API_KEY")));
        self.mock_mode = env("AI_TEST_MODE").is_some_and(|v| v == "mock");
        if self.mock_mode {
            self.providers = vec![ProviderKind::Mock];
        }
        Ok(())
    }

    /// Build from a plain map of environment values (defaults + env, no file).
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env(|k| vars.get(k).cloned())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn set_ai_model(&mut self, raw: &str) -> Result<(), ConfigError> {
        let providers = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ProviderKind::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if providers.is_empty() {
            return Err(ConfigError::invalid("AI_MODEL", raw));
        }
        self.ai_model = raw.trim().to_string();
        self.providers = providers;
        Ok(())
    }

    pub fn credential_for(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Claude => self.credentials.claude.as_deref(),
            ProviderKind::OpenAi => self.credentials.openai.as_deref(),
            ProviderKind::Mock => None,
        }
    }

    /// Configured providers that can actually be called, in preference order.
    pub fn usable_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .copied()
            .filter(|k| match k {
                ProviderKind::Mock => self.mock_mode,
                other => self.credential_for(*other).is_some(),
            })
            .collect()
    }

    /// Fail fast on anything that would make the run meaningless.
    /// Dry runs never call a provider, so they do not need credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validation.validate()?;
        if self.provider.concurrency == 0 {
            return Err(ConfigError::invalid("PROVIDER_CONCURRENCY", 0));
        }
        if self.provider.calls_per_minute == 0 {
            return Err(ConfigError::invalid("PROVIDER_CALLS_PER_MINUTE", 0));
        }
        let budget = self.run_budget.as_secs();
        if self.run_budget.is_zero() || budget > MAX_RUN_BUDGET_SECS {
            return Err(ConfigError::invalid("RUN_BUDGET_SECS", budget));
        }
        let timeout = self.provider.timeout.as_secs();
        if self.provider.timeout.is_zero() || timeout > MAX_PROVIDER_TIMEOUT_SECS {
            return Err(ConfigError::invalid("PROVIDER_TIMEOUT_SECS", timeout));
        }
        if self.provider.max_retries > MAX_PROVIDER_RETRIES {
            return Err(ConfigError::invalid("PROVIDER_MAX_RETRIES", self.provider.max_retries));
        }
        if !self.dry_run && self.usable_providers().is_empty() {
            return Err(ConfigError::NoUsableProvider(self.ai_model.clone()));
        }
        Ok(())
    }
}

/// Feeds the collector reads when no `[[feeds]]` table is configured.
fn default_feeds() -> Vec<FeedSpec> {
    [
        ("yonhap", "https://en.yna.co.kr/RSS/news.xml"),
        (
            "google_news_kr",
            "https://news.google.com/rss?hl=ko&gl=KR&ceid=KR:ko",
        ),
    ]
    .into_iter()
    .map(|(name, url)| FeedSpec {
        name: name.to_string(),
        kind: FeedKind::Rss,
        url: Some(url.to_string()),
        path: None,
        limit: Some(10),
    })
    .collect()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw)),
    }
}

/// Parse straight into the target type so out-of-range values are rejected
/// instead of truncated.
fn parse_num<T, F>(env: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, raw)),
    }
}
