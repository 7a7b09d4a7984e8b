// src/metrics.rs
//! Prometheus recorder for the batch binary. There is no listener: the
//! rendered exposition text is written to a file at the end of the run.

use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder and register descriptions.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_all();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("write metrics {}", path.display()))
    }
}

/// Register help text for every metric the pipeline emits. Runs once.
pub fn describe_all() {
    static DESCRIBED: OnceCell<()> = OnceCell::new();
    DESCRIBED.get_or_init(|| {
        describe_counter!("ingest_entries_total", "Feed entries seen by the normalizer");
        describe_counter!("ingest_parse_errors_total", "Feed entries dropped as malformed");
        describe_counter!("ingest_duplicates_total", "Entries collapsed by canonical URL");
        describe_counter!("ingest_feed_errors_total", "Feeds that could not be read");
        describe_histogram!("ingest_parse_ms", Unit::Milliseconds, "RSS parse time");
        describe_counter!("cluster_total", "Story clusters built");
        describe_counter!("stories_publishable_total", "Stories cleared for generation");
        describe_counter!("stories_held_total", "Stories held for insufficient corroboration");
        describe_counter!("generation_attempts_total", "Provider calls, by provider");
        describe_counter!("generation_failures_total", "Failed or malformed provider calls, by provider");
        describe_histogram!("generation_ms", Unit::Milliseconds, "Provider call latency");
        describe_counter!("publications_total", "Publication records created");
        describe_counter!("publication_conflicts_total", "Articles refused for duplicate content");
        describe_gauge!("pipeline_last_run_ts", Unit::Seconds, "Unix time the last run finished");
    });
}
