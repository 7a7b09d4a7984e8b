//! KONA pipeline, batch entrypoint.
//! One invocation = one run: collect, validate, generate, publish, report.
//!
//! Exit codes: 0 run completed (per-story failures are in the report),
//! 2 configuration error, 1 any other startup failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use kona_newsroom::metrics::Metrics;
use kona_newsroom::{run_pipeline, PipelineConfig, RunContext};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USER_AGENT: &str = "kona-newsroom/0.1 (+github.com/kona-news)";

/// Compact logs by default; `LOG_FORMAT=json` for the workflow runner.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kona_newsroom=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op in CI where secrets come from the environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let config = match PipelineConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(2);
        }
    };
    info!(
        ai_model = %config.ai_model,
        max_articles = config.max_articles_per_run,
        dry_run = config.dry_run,
        feeds = config.feeds.len(),
        "starting run"
    );

    let http = match reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "http client");
            return ExitCode::from(1);
        }
    };

    let ctx = RunContext::from_config(config, &http);
    let outcome = match run_pipeline(&ctx).await {
        Ok(o) => o,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(2);
        }
    };

    info!(summary = %outcome.report.summary(), errors = outcome.report.errors.len(), "run complete");
    for article in &outcome.published {
        info!(
            story_id = %article.article.story_id,
            provider = %article.article.provider_used,
            "published"
        );
    }

    if let Some(path) = std::env::var_os("REPORT_PATH").map(PathBuf::from) {
        if let Err(e) = outcome.report.write_json(&path) {
            warn!(error = %e, "could not write run report");
        }
    }
    if let (Some(m), Some(path)) = (&metrics, std::env::var_os("METRICS_PATH").map(PathBuf::from)) {
        if let Err(e) = m.write_to(&path) {
            warn!(error = %e, "could not write metrics");
        }
    }

    ExitCode::SUCCESS
}
