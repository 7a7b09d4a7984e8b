// src/report.rs
//! Per-run report handed to the workflow runner.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryError {
    /// Cluster id, or the feed entry locator for parse errors.
    pub story_id: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Stories a generation was started for.
    pub attempted: usize,
    pub published: usize,
    /// Publishable stories not attempted (cap, time budget, dry run) or
    /// already published.
    pub skipped: usize,
    /// Stories where every provider was exhausted.
    pub failed: usize,
    /// Stories that did not qualify for generation.
    pub held: usize,
    pub dropped_entries: usize,
    pub clusters: usize,
    pub errors: Vec<StoryError>,
    pub period_key: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(period_key: impl Into<String>, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            attempted: 0,
            published: 0,
            skipped: 0,
            failed: 0,
            held: 0,
            dropped_entries: 0,
            clusters: 0,
            errors: Vec::new(),
            period_key: period_key.into(),
            dry_run,
            started_at,
            finished_at: None,
        }
    }

    pub fn record(&mut self, story_id: impl Into<String>, kind: ErrorKind, detail: impl Into<String>) {
        self.errors.push(StoryError {
            story_id: story_id.into(),
            kind,
            detail: detail.into(),
        });
    }

    /// Error entries of one kind, in report order.
    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &StoryError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn summary(&self) -> String {
        format!(
            "attempted={} published={} skipped={} failed={} held={} dropped={} clusters={}",
            self.attempted,
            self.published,
            self.skipped,
            self.failed,
            self.held,
            self.dropped_entries,
            self.clusters
        )
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_error_kinds_by_name() {
        let mut r = RunReport::new("2024-05-01", false, Utc::now());
        r.record("abc", ErrorKind::InsufficientCorroboration, "1 source");
        let v: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(v["errors"][0]["kind"], "InsufficientCorroboration");
        assert_eq!(r.errors_of(ErrorKind::GenerationError).count(), 0);
        assert!(r.summary().contains("published=0"));
    }
}
