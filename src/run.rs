// src/run.rs
//! Run coordinator: one bounded batch from feed entries to publications.
//!
//! Stages run strictly forward: normalize, cluster, validate, generate,
//! publish. Validation is pure and finishes before any provider is called.
//! Publishable stories are started in priority order while a cap slot is free
//! and the time budget lasts; generation for distinct stories runs
//! concurrently, bounded by the per-provider limiters. Per-story problems land
//! in the [`RunReport`]; only configuration problems return `Err`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::task::{AbortHandle, Id as TaskId, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analyze::{by_priority, cluster_items, validate_all, ValidatedStory};
use crate::artifacts::{ArtifactSink, FileArtifactStore, PublishedArticle};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, ErrorKind};
use crate::generate::{
    build_providers, ArticleBudget, BudgetSlot, DynProvider, GenerationFailure, Orchestrator,
};
use crate::ingest::providers::build_sources;
use crate::ingest::types::{FeedEntry, FeedSource};
use crate::ingest::{collect_entries, normalize_entries};
use crate::publish::{period_key, Gatekeeper, JsonFileLedger, PublicationLedger, PublicationOutcome};
use crate::report::RunReport;
use crate::source_weights::SourceWeightsConfig;

/// Everything one run needs, built once and passed explicitly.
pub struct RunContext {
    pub config: PipelineConfig,
    pub weights: SourceWeightsConfig,
    pub sources: Vec<Box<dyn FeedSource>>,
    pub providers: Vec<DynProvider>,
    pub ledger: Arc<dyn PublicationLedger>,
    pub artifacts: Arc<dyn ArtifactSink>,
    /// Run start; fixes the period key.
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Production wiring from a validated config.
    pub fn from_config(config: PipelineConfig, http: &reqwest::Client) -> Self {
        let weights = SourceWeightsConfig::load_from_file(&config.source_weights_path);
        let sources = build_sources(&config.feeds, http);
        let providers = if config.dry_run {
            Vec::new()
        } else {
            build_providers(&config, http)
        };
        let ledger: Arc<dyn PublicationLedger> = Arc::new(JsonFileLedger::new(&config.ledger_path));
        let artifacts: Arc<dyn ArtifactSink> = Arc::new(FileArtifactStore::new(&config.artifacts_dir));
        Self {
            config,
            weights,
            sources,
            providers,
            ledger,
            artifacts,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    /// Every validated story, in priority order.
    pub stories: Vec<ValidatedStory>,
    pub published: Vec<PublishedArticle>,
}

enum StoryResult {
    Published(Box<PublishedArticle>),
    /// Stopped by the time budget before anything was recorded.
    Cancelled(String),
    AlreadyPublished(String),
    Duplicate { story_id: String, existing: String },
    Failed { story_id: String, failure: GenerationFailure },
    LedgerError { story_id: String, error: String },
}

/// Collect from the context's feeds, then run.
pub async fn run_pipeline(ctx: &RunContext) -> Result<RunOutcome, ConfigError> {
    check_config(ctx)?;
    let entries = collect_entries(&ctx.sources).await;
    run_entries(ctx, entries).await
}

fn check_config(ctx: &RunContext) -> Result<(), ConfigError> {
    ctx.config.validate()?;
    if !ctx.config.dry_run && ctx.providers.is_empty() {
        return Err(ConfigError::NoUsableProvider(ctx.config.ai_model.clone()));
    }
    Ok(())
}

/// Run on entries already pulled from the feeds.
pub async fn run_entries(ctx: &RunContext, entries: Vec<FeedEntry>) -> Result<RunOutcome, ConfigError> {
    check_config(ctx)?;
    let cfg = &ctx.config;
    let deadline = Instant::now()
        .checked_add(cfg.run_budget)
        .ok_or_else(|| ConfigError::invalid("RUN_BUDGET_SECS", cfg.run_budget.as_secs()))?;
    let period = period_key(ctx.started_at, cfg.period);
    let mut report = RunReport::new(period.clone(), cfg.dry_run, ctx.started_at);

    // Normalize.
    let batch = normalize_entries(entries, &ctx.weights);
    report.dropped_entries = batch.errors.len();
    for e in &batch.errors {
        report.record(e.locator.clone(), ErrorKind::CollectionParseError, e.reason.clone());
    }

    // Cluster and validate.
    let clusters = cluster_items(&batch.items, &cfg.validation);
    report.clusters = clusters.len();
    counter!("cluster_total").increment(clusters.len() as u64);
    let mut stories = validate_all(&clusters, &cfg.validation);
    stories.sort_by(by_priority);

    if let Err(e) = ctx.artifacts.store_stories(&stories).await {
        warn!(target: "run", error = %e, "could not store validated stories");
    }

    let mut publishable: Vec<ValidatedStory> = Vec::new();
    for story in &stories {
        match &story.hold_reason {
            Some(reason) => {
                report.held += 1;
                report.record(
                    story.cluster_id.clone(),
                    ErrorKind::InsufficientCorroboration,
                    reason.to_string(),
                );
            }
            None => publishable.push(story.clone()),
        }
    }
    counter!("stories_held_total").increment(report.held as u64);
    counter!("stories_publishable_total").increment(publishable.len() as u64);
    info!(
        target: "run",
        items = batch.items.len(),
        clusters = report.clusters,
        publishable = publishable.len(),
        held = report.held,
        "validation done"
    );

    let mut published = Vec::new();
    if cfg.dry_run {
        report.skipped = publishable.len();
    } else {
        generate_and_publish(ctx, &period, publishable, deadline, &mut report, &mut published).await;
    }

    report.finish();
    gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
    info!(target: "run", period = %report.period_key, summary = %report.summary(), "run finished");
    Ok(RunOutcome {
        report,
        stories,
        published,
    })
}

// Story task phases. A task may only be aborted while still generating; once
// it has claimed the publishing phase it runs to completion so a ledger record
// is never written without its article reaching the report.
const GENERATING: u8 = 0;
const PUBLISHING: u8 = 1;
const CANCELLED: u8 = 2;

struct InFlight {
    story_id: String,
    phase: Arc<AtomicU8>,
    abort: AbortHandle,
}

type InFlightMap = HashMap<TaskId, InFlight>;

async fn generate_and_publish(
    ctx: &RunContext,
    period: &str,
    publishable: Vec<ValidatedStory>,
    deadline: Instant,
    report: &mut RunReport,
    published: &mut Vec<PublishedArticle>,
) {
    let cfg = &ctx.config;
    let orchestrator = Arc::new(Orchestrator::new(ctx.providers.clone(), cfg.provider.clone()));
    let gatekeeper = Arc::new(Gatekeeper::new(Arc::clone(&ctx.ledger), period));
    let budget = Arc::new(ArticleBudget::new(cfg.max_articles_per_run));
    let mut tasks: JoinSet<StoryResult> = JoinSet::new();
    let mut in_flight: InFlightMap = HashMap::new();
    let mut out_of_time = false;
    debug!(target: "run", providers = ?orchestrator.provider_names(), cap = cfg.max_articles_per_run, "generation started");

    'stories: for story in publishable {
        if Instant::now() >= deadline {
            out_of_time = true;
            report.skipped += 1;
            continue;
        }

        match gatekeeper.already_published(&story.cluster_id).await {
            Ok(Some(_)) => {
                debug!(target: "run", story_id = %story.cluster_id, "already published this period");
                apply(StoryResult::AlreadyPublished(story.cluster_id), report, published);
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                apply(
                    StoryResult::LedgerError {
                        story_id: story.cluster_id,
                        error: format!("{e:#}"),
                    },
                    report,
                    published,
                );
                continue;
            }
        }

        // Wait for a cap slot; in-flight stories may give theirs back.
        let slot = loop {
            if let Some(slot) = budget.try_reserve() {
                break slot;
            }
            if tasks.is_empty() {
                // Cap reached by published articles.
                report.skipped += 1;
                continue 'stories;
            }
            match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(joined)) => apply_joined(joined, &mut in_flight, report, published),
                Ok(None) => {}
                Err(_) => {
                    out_of_time = true;
                    report.skipped += 1;
                    continue 'stories;
                }
            }
        };

        report.attempted += 1;
        let story_id = story.cluster_id.clone();
        let phase = Arc::new(AtomicU8::new(GENERATING));
        let orchestrator = Arc::clone(&orchestrator);
        let gatekeeper = Arc::clone(&gatekeeper);
        let artifacts = Arc::clone(&ctx.artifacts);
        let task_phase = Arc::clone(&phase);
        let abort = tasks.spawn(async move {
            produce(story, slot, &task_phase, &orchestrator, &gatekeeper, artifacts.as_ref()).await
        });
        in_flight.insert(
            abort.id(),
            InFlight {
                story_id,
                phase,
                abort,
            },
        );
    }

    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
            Ok(Some(joined)) => apply_joined(joined, &mut in_flight, report, published),
            Ok(None) => break,
            Err(_) => {
                out_of_time = true;
                let mut cancelled = 0usize;
                for task in in_flight.values() {
                    if task
                        .phase
                        .compare_exchange(GENERATING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        task.abort.abort();
                        cancelled += 1;
                    }
                }
                warn!(
                    target: "run",
                    cancelled,
                    publishing = in_flight.len() - cancelled,
                    "time budget exhausted, in-flight generation cancelled"
                );
                // Stories already publishing finish and are reported normally.
                while let Some(joined) = tasks.join_next_with_id().await {
                    apply_joined(joined, &mut in_flight, report, published);
                }
                break;
            }
        }
    }

    if out_of_time {
        warn!(target: "run", budget_secs = cfg.run_budget.as_secs(), "run stopped by time budget");
    }
}

async fn produce(
    story: ValidatedStory,
    slot: BudgetSlot,
    phase: &AtomicU8,
    orchestrator: &Orchestrator,
    gatekeeper: &Gatekeeper,
    artifacts: &dyn ArtifactSink,
) -> StoryResult {
    let article = match orchestrator.generate(&story).await {
        Ok(a) => a,
        Err(failure) => {
            return StoryResult::Failed {
                story_id: story.cluster_id,
                failure,
            }
        }
    };

    if phase
        .compare_exchange(GENERATING, PUBLISHING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return StoryResult::Cancelled(story.cluster_id);
    }

    match gatekeeper.publish(&article).await {
        Ok(PublicationOutcome::Published(record)) => {
            slot.commit();
            let out = PublishedArticle {
                article,
                record,
                consensus_facts: story.consensus_facts,
                divergent_claims: story.divergent_claims,
                source_urls: story.source_urls,
            };
            if let Err(e) = artifacts.store_article(&out).await {
                warn!(target: "run", story_id = %out.article.story_id, error = %e, "could not store article");
            }
            StoryResult::Published(Box::new(out))
        }
        Ok(PublicationOutcome::AlreadyPublished(_)) => StoryResult::AlreadyPublished(story.cluster_id),
        Ok(PublicationOutcome::DuplicateContent(existing)) => StoryResult::Duplicate {
            story_id: story.cluster_id,
            existing: existing.story_id,
        },
        Err(e) => StoryResult::LedgerError {
            story_id: story.cluster_id,
            error: format!("{e:#}"),
        },
    }
}

fn apply_joined(
    joined: Result<(TaskId, StoryResult), JoinError>,
    in_flight: &mut InFlightMap,
    report: &mut RunReport,
    published: &mut Vec<PublishedArticle>,
) {
    match joined {
        Ok((id, result)) => {
            in_flight.remove(&id);
            apply(result, report, published);
        }
        Err(e) => {
            let story_id = in_flight
                .remove(&e.id())
                .map(|t| t.story_id)
                .unwrap_or_default();
            if e.is_cancelled() {
                debug!(target: "run", story_id = %story_id, "generation cancelled by time budget");
                report.skipped += 1;
            } else {
                report.failed += 1;
                warn!(target: "run", story_id = %story_id, "story task panicked");
                report.record(story_id, ErrorKind::GenerationError, format!("story task panicked: {e}"));
            }
        }
    }
}

fn apply(result: StoryResult, report: &mut RunReport, published: &mut Vec<PublishedArticle>) {
    match result {
        StoryResult::Published(p) => {
            report.published += 1;
            published.push(*p);
        }
        StoryResult::Cancelled(story_id) => {
            debug!(target: "run", story_id = %story_id, "generation cancelled by time budget");
            report.skipped += 1;
        }
        StoryResult::AlreadyPublished(story_id) => {
            report.skipped += 1;
            report.record(story_id, ErrorKind::PublicationConflict, "already published for this period");
        }
        StoryResult::Duplicate { story_id, existing } => {
            report.skipped += 1;
            report.record(
                story_id,
                ErrorKind::PublicationConflict,
                format!("same content as story {existing}"),
            );
        }
        StoryResult::Failed { story_id, failure } => {
            report.failed += 1;
            warn!(target: "run", story_id = %story_id, attempts = failure.attempts, "generation failed");
            report.record(story_id, ErrorKind::GenerationError, failure.to_string());
        }
        StoryResult::LedgerError { story_id, error } => {
            report.skipped += 1;
            warn!(target: "run", story_id = %story_id, %error, "ledger unavailable");
            report.record(story_id, ErrorKind::PublicationConflict, format!("ledger error: {error}"));
        }
    }
}
