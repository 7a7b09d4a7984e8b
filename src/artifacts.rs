// src/artifacts.rs
//! Artifact store: validated stories and published articles handed to the
//! external renderer. Writes are best-effort; a failing sink never fails a run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analyze::{Fact, ValidatedStory};
use crate::generate::GeneratedArticle;
use crate::publish::PublicationRecord;

/// Everything a renderer needs to build a page without re-deriving facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArticle {
    pub article: GeneratedArticle,
    pub record: PublicationRecord,
    pub consensus_facts: Vec<Fact>,
    pub divergent_claims: Vec<Fact>,
    pub source_urls: Vec<String>,
}

#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store_stories(&self, stories: &[ValidatedStory]) -> Result<()>;
    async fn store_article(&self, article: &PublishedArticle) -> Result<()>;
}

/// Writes under `root`:
/// `validated_stories/stories_<ts>.json` and
/// `generated_articles/<story_id>_<ts>.json`.
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn write_json<T: Serialize>(&self, dir: &str, file: &str, value: &T) -> Result<PathBuf> {
        let dir = self.root.join(dir);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(file);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(value)?;
        let mut f = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(json.as_bytes())?;
        fs::rename(&tmp, &path).with_context(|| format!("rename to {}", path.display()))?;
        Ok(path)
    }
}

fn stamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Keep file names portable: alphanumerics, `-` and `_` only.
fn safe_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect()
}

#[async_trait::async_trait]
impl ArtifactSink for FileArtifactStore {
    async fn store_stories(&self, stories: &[ValidatedStory]) -> Result<()> {
        self.write_json("validated_stories", &format!("stories_{}.json", stamp()), &stories)?;
        Ok(())
    }

    async fn store_article(&self, article: &PublishedArticle) -> Result<()> {
        let name = format!("{}_{}.json", safe_name(&article.article.story_id), stamp());
        self.write_json("generated_articles", &name, article)?;
        Ok(())
    }
}

/// Discards everything.
pub struct NullArtifactStore;

#[async_trait::async_trait]
impl ArtifactSink for NullArtifactStore {
    async fn store_stories(&self, _stories: &[ValidatedStory]) -> Result<()> {
        Ok(())
    }
    async fn store_article(&self, _article: &PublishedArticle) -> Result<()> {
        Ok(())
    }
}

// --- Test helper ---
/// Keeps everything in memory for assertions.
#[derive(Default)]
pub struct MemoryArtifactStore {
    pub stories: std::sync::Mutex<Vec<ValidatedStory>>,
    pub articles: std::sync::Mutex<Vec<PublishedArticle>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ArtifactSink for MemoryArtifactStore {
    async fn store_stories(&self, stories: &[ValidatedStory]) -> Result<()> {
        if let Ok(mut g) = self.stories.lock() {
            g.extend_from_slice(stories);
        }
        Ok(())
    }
    async fn store_article(&self, article: &PublishedArticle) -> Result<()> {
        if let Ok(mut g) = self.articles.lock() {
            g.push(article.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_name_strips_path_characters() {
        assert_eq!(safe_name("../a b/c"), "___a_b_c");
    }

    #[tokio::test]
    async fn file_store_writes_story_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.store_stories(&[]).await.unwrap();
        let files: Vec<_> = fs::read_dir(dir.path().join("validated_stories"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("stories_") && files[0].ends_with(".json"));
        let body = fs::read_to_string(dir.path().join("validated_stories").join(&files[0])).unwrap();
        assert_eq!(body.trim(), "[]");
    }
}
