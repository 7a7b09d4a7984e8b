// src/publish/ledger.rs
//! Persisted publication ledger: the only source of truth for idempotency.
//!
//! `record_if_absent` is the single check-then-record step. Both
//! implementations make it atomic: `MemoryLedger` under one mutex,
//! `JsonFileLedger` under an in-process mutex plus an exclusive `.lock` file
//! so two runs on the same machine cannot interleave.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub story_id: String,
    pub period_key: String,
    pub content_hash: String,
    pub published_at: DateTime<Utc>,
}

/// Result of the atomic check-then-record step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A record already exists for (story_id, period_key).
    StoryExists(PublicationRecord),
    /// Another story already published identical content.
    HashExists(PublicationRecord),
}

#[async_trait]
pub trait PublicationLedger: Send + Sync {
    async fn find(&self, story_id: &str, period_key: &str) -> Result<Option<PublicationRecord>>;
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<PublicationRecord>>;
    async fn record_if_absent(&self, record: PublicationRecord) -> Result<RecordOutcome>;
    async fn all(&self) -> Result<Vec<PublicationRecord>>;
}

fn check(records: &[PublicationRecord], new: &PublicationRecord) -> Option<RecordOutcome> {
    if let Some(r) = records
        .iter()
        .find(|r| r.story_id == new.story_id && r.period_key == new.period_key)
    {
        return Some(RecordOutcome::StoryExists(r.clone()));
    }
    records
        .iter()
        .find(|r| r.content_hash == new.content_hash && r.story_id != new.story_id)
        .map(|r| RecordOutcome::HashExists(r.clone()))
}

// ------------------------------------------------------------
// In-memory
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<PublicationRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublicationLedger for MemoryLedger {
    async fn find(&self, story_id: &str, period_key: &str) -> Result<Option<PublicationRecord>> {
        let g = self.records.lock().await;
        Ok(g.iter()
            .find(|r| r.story_id == story_id && r.period_key == period_key)
            .cloned())
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<PublicationRecord>> {
        let g = self.records.lock().await;
        Ok(g.iter().find(|r| r.content_hash == content_hash).cloned())
    }

    async fn record_if_absent(&self, record: PublicationRecord) -> Result<RecordOutcome> {
        let mut g = self.records.lock().await;
        if let Some(conflict) = check(&g, &record) {
            return Ok(conflict);
        }
        g.push(record);
        Ok(RecordOutcome::Recorded)
    }

    async fn all(&self) -> Result<Vec<PublicationRecord>> {
        Ok(self.records.lock().await.clone())
    }
}

// ------------------------------------------------------------
// JSON file
// ------------------------------------------------------------

const LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_POLL: Duration = Duration::from_millis(50);
/// A lock file older than this is left over from a crashed run.
const LOCK_STALE: Duration = Duration::from_secs(120);

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    records: Vec<PublicationRecord>,
}

pub struct JsonFileLedger {
    path: PathBuf,
    local: Mutex<()>,
}

impl JsonFileLedger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            local: Mutex::new(()),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn read(&self) -> Result<LedgerFile> {
        match fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => Ok(LedgerFile::default()),
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("corrupt ledger {}", self.path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LedgerFile::default()),
            Err(e) => Err(e).with_context(|| format!("read ledger {}", self.path.display())),
        }
    }

    fn write(&self, file: &LedgerFile) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(file)?;
        let mut f = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(json.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace ledger {}", self.path.display()))?;
        Ok(())
    }

    async fn acquire_file_lock(&self) -> Result<FileLock> {
        let lock = self.lock_path();
        if let Some(dir) = lock.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let deadline = tokio::time::Instant::now() + LOCK_WAIT;
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&lock) {
                Ok(_) => return Ok(FileLock { path: lock }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&lock) {
                        warn!(target: "publish", lock = %lock.display(), "removing stale ledger lock");
                        let _ = fs::remove_file(&lock);
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        anyhow::bail!("ledger lock {} held too long", lock.display());
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("create lock {}", lock.display()))
                }
            }
        }
    }
}

fn is_stale(lock: &Path) -> bool {
    fs::metadata(lock)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age > LOCK_STALE)
}

/// Removes the lock file on drop.
struct FileLock {
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[async_trait]
impl PublicationLedger for JsonFileLedger {
    async fn find(&self, story_id: &str, period_key: &str) -> Result<Option<PublicationRecord>> {
        let _g = self.local.lock().await;
        Ok(self
            .read()?
            .records
            .into_iter()
            .find(|r| r.story_id == story_id && r.period_key == period_key))
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<PublicationRecord>> {
        let _g = self.local.lock().await;
        Ok(self
            .read()?
            .records
            .into_iter()
            .find(|r| r.content_hash == content_hash))
    }

    async fn record_if_absent(&self, record: PublicationRecord) -> Result<RecordOutcome> {
        let _g = self.local.lock().await;
        let _lock = self.acquire_file_lock().await?;
        let mut file = self.read()?;
        if let Some(conflict) = check(&file.records, &record) {
            return Ok(conflict);
        }
        debug!(target: "publish", story_id = %record.story_id, period = %record.period_key, "ledger append");
        file.records.push(record);
        self.write(&file)?;
        Ok(RecordOutcome::Recorded)
    }

    async fn all(&self) -> Result<Vec<PublicationRecord>> {
        let _g = self.local.lock().await;
        Ok(self.read()?.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn rec(story: &str, period: &str, hash: &str) -> PublicationRecord {
        PublicationRecord {
            story_id: story.into(),
            period_key: period.into(),
            content_hash: hash.into(),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn memory_ledger_rejects_repeat_and_duplicate_hash() {
        let l = MemoryLedger::new();
        assert_eq!(l.record_if_absent(rec("s1", "2024-05-01", "h1")).await.unwrap(), RecordOutcome::Recorded);
        assert!(matches!(
            l.record_if_absent(rec("s1", "2024-05-01", "h2")).await.unwrap(),
            RecordOutcome::StoryExists(_)
        ));
        assert!(matches!(
            l.record_if_absent(rec("s2", "2024-05-01", "h1")).await.unwrap(),
            RecordOutcome::HashExists(r) if r.story_id == "s1"
        ));
        // Same story, next period.
        assert_eq!(l.record_if_absent(rec("s1", "2024-05-02", "h3")).await.unwrap(), RecordOutcome::Recorded);
    }

    #[tokio::test]
    async fn file_ledger_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("publications.json");
        {
            let l = JsonFileLedger::new(&path);
            l.record_if_absent(rec("s1", "2024-05-01", "h1")).await.unwrap();
        }
        let l = JsonFileLedger::new(&path);
        assert!(l.find("s1", "2024-05-01").await.unwrap().is_some());
        assert!(l.find_by_hash("h1").await.unwrap().is_some());
        assert!(matches!(
            l.record_if_absent(rec("s1", "2024-05-01", "h9")).await.unwrap(),
            RecordOutcome::StoryExists(_)
        ));
        assert!(!l.lock_path().exists());
    }

    #[tokio::test]
    async fn concurrent_ledgers_record_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publications.json");
        let mut handles = Vec::new();
        for i in 0..8 {
            // Separate instances share only the file and its lock.
            let l = Arc::new(JsonFileLedger::new(&path));
            handles.push(tokio::spawn(async move {
                l.record_if_absent(rec("s1", "2024-05-01", &format!("h{i}"))).await.unwrap()
            }));
        }
        let mut recorded = 0;
        for h in handles {
            if h.await.unwrap() == RecordOutcome::Recorded {
                recorded += 1;
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(JsonFileLedger::new(&path).all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn held_lock_times_out_instead_of_corrupting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publications.json");
        let l = JsonFileLedger::new(&path);
        fs::write(l.lock_path(), b"").unwrap();
        tokio::time::pause();
        let err = l.record_if_absent(rec("s1", "d", "h")).await.unwrap_err();
        assert!(err.to_string().contains("held too long"));
    }
}
