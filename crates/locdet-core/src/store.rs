//! Embedded persistence for jobs, feedback, and the preview cache using redb.
//!
//! # Table design
//!
//! - `jobs`: job_id → JSON job record.
//! - `feedback`: `"{job_id}/{feedback_id}"` → JSON feedback. The composite
//!   key makes per-job listing a prefix range scan.
//! - `preview_cache`: `"preview:{blueprint_hash}:{model_version}"` → JSON
//!   cache entry with an expiry timestamp; expired entries read as a miss
//!   and are removed on the next lookup.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{DetectError, Result};
use crate::feedback::Feedback;
use crate::job::{Job, JobStatus};
use crate::stage::StageResult;
use serde::{Deserialize, Serialize};

const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");
const FEEDBACK: TableDefinition<&str, &[u8]> = TableDefinition::new("feedback");
const PREVIEW_CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("preview_cache");

fn storage_err(e: impl std::fmt::Display) -> DetectError {
    DetectError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Cache entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedPreview {
    result: StageResult,
    model_version: String,
    expires_at: i64,
}

pub fn preview_cache_key(blueprint_hash: &str, model_version: &str) -> String {
    format!("preview:{blueprint_hash}:{model_version}")
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Persistent store for jobs, feedback, and cached previews.
pub struct JobStore {
    db: Database,
}

impl JobStore {
    /// Open or create the database at `path`, ensuring all tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(storage_err)?;
        let wt = db.begin_write().map_err(storage_err)?;
        wt.open_table(JOBS).map_err(storage_err)?;
        wt.open_table(FEEDBACK).map_err(storage_err)?;
        wt.open_table(PREVIEW_CACHE).map_err(storage_err)?;
        wt.commit().map_err(storage_err)?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    pub fn put_job(&self, job: &Job) -> Result<()> {
        let value = serde_json::to_vec(job)?;
        let wt = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = wt.open_table(JOBS).map_err(storage_err)?;
            table
                .insert(job.job_id.as_str(), value.as_slice())
                .map_err(storage_err)?;
        }
        wt.commit().map_err(storage_err)?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        let rt = self.db.begin_read().map_err(storage_err)?;
        let table = rt.open_table(JOBS).map_err(storage_err)?;
        let Some(value) = table.get(job_id).map_err(storage_err)? else {
            return Err(DetectError::JobNotFound(job_id.to_string()));
        };
        Ok(serde_json::from_slice(value.value())?)
    }

    /// Read-modify-write a job inside a single write transaction.
    ///
    /// The store's writer lock serializes concurrent mutations, so the
    /// closure always observes the latest committed state.
    pub fn update_job<F>(&self, job_id: &str, mutate: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        let wt = self.db.begin_write().map_err(storage_err)?;
        let job = {
            let mut table = wt.open_table(JOBS).map_err(storage_err)?;
            let mut job: Job = {
                let Some(value) = table.get(job_id).map_err(storage_err)? else {
                    return Err(DetectError::JobNotFound(job_id.to_string()));
                };
                serde_json::from_slice(value.value())?
            };
            mutate(&mut job)?;
            let value = serde_json::to_vec(&job)?;
            table
                .insert(job_id, value.as_slice())
                .map_err(storage_err)?;
            job
        };
        wt.commit().map_err(storage_err)?;
        Ok(job)
    }

    /// Cancel a job, failing if it already reached a terminal state.
    pub fn cancel_job(&self, job_id: &str) -> Result<Job> {
        self.update_job(job_id, |job| {
            if !job.can_be_cancelled() {
                return Err(DetectError::JobAlreadyFinished {
                    job_id: job.job_id.clone(),
                    status: job.status.to_string(),
                });
            }
            job.update_status(JobStatus::Cancelled, None);
            Ok(())
        })
    }

    /// Remove a job record (compensation path when blob persistence fails).
    pub fn delete_job(&self, job_id: &str) -> Result<bool> {
        let wt = self.db.begin_write().map_err(storage_err)?;
        let existed = {
            let mut table = wt.open_table(JOBS).map_err(storage_err)?;
            let existed = table.remove(job_id).map_err(storage_err)?.is_some();
            existed
        };
        wt.commit().map_err(storage_err)?;
        Ok(existed)
    }

    // -----------------------------------------------------------------------
    // Feedback
    // -----------------------------------------------------------------------

    pub fn put_feedback(&self, feedback: &Feedback) -> Result<()> {
        let key = format!("{}/{}", feedback.job_id, feedback.feedback_id);
        let value = serde_json::to_vec(feedback)?;
        let wt = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = wt.open_table(FEEDBACK).map_err(storage_err)?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(storage_err)?;
        }
        wt.commit().map_err(storage_err)?;
        Ok(())
    }

    pub fn feedback_for_job(&self, job_id: &str) -> Result<Vec<Feedback>> {
        let rt = self.db.begin_read().map_err(storage_err)?;
        let table = rt.open_table(FEEDBACK).map_err(storage_err)?;
        // '/' sorts below '0', so this range covers exactly the job's keys.
        let start = format!("{job_id}/");
        let end = format!("{job_id}0");
        let mut result = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(storage_err)?
        {
            let (_, value) = entry.map_err(storage_err)?;
            result.push(serde_json::from_slice(value.value())?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Preview cache
    // -----------------------------------------------------------------------

    pub fn store_cached_preview(
        &self,
        blueprint_hash: &str,
        model_version: &str,
        result: &StageResult,
        ttl_seconds: u64,
    ) -> Result<()> {
        let key = preview_cache_key(blueprint_hash, model_version);
        let entry = CachedPreview {
            result: result.clone(),
            model_version: model_version.to_string(),
            expires_at: Utc::now().timestamp() + ttl_seconds as i64,
        };
        let value = serde_json::to_vec(&entry)?;
        let wt = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = wt.open_table(PREVIEW_CACHE).map_err(storage_err)?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(storage_err)?;
        }
        wt.commit().map_err(storage_err)?;
        tracing::debug!(cache_key = %key, "preview cached");
        Ok(())
    }

    /// Cached preview, or `None` on miss or expiry (expired entries are
    /// removed).
    pub fn get_cached_preview(
        &self,
        blueprint_hash: &str,
        model_version: &str,
    ) -> Result<Option<StageResult>> {
        let key = preview_cache_key(blueprint_hash, model_version);
        let entry: Option<CachedPreview> = {
            let rt = self.db.begin_read().map_err(storage_err)?;
            let table = rt.open_table(PREVIEW_CACHE).map_err(storage_err)?;
            match table.get(key.as_str()).map_err(storage_err)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            }
        };

        match entry {
            Some(entry) if entry.expires_at > Utc::now().timestamp() => {
                tracing::debug!(cache_key = %key, "preview cache hit");
                Ok(Some(entry.result))
            }
            Some(_) => {
                tracing::debug!(cache_key = %key, "preview cache entry expired");
                let wt = self.db.begin_write().map_err(storage_err)?;
                {
                    let mut table = wt.open_table(PREVIEW_CACHE).map_err(storage_err)?;
                    table.remove(key.as_str()).map_err(storage_err)?;
                }
                wt.commit().map_err(storage_err)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackKind;
    use crate::stage::{Stage, StageTimings};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> JobStore {
        JobStore::open(&dir.path().join("test.redb")).unwrap()
    }

    fn preview_result(job_id: &str) -> StageResult {
        StageResult {
            job_id: job_id.into(),
            stage: Stage::Preview,
            rooms: vec![],
            processing_time_seconds: 0.5,
            timestamp: Utc::now(),
            timing_metrics: StageTimings {
                total_seconds: 0.5,
                ..Default::default()
            },
        }
    }

    #[test]
    fn put_and_get_job() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let job = Job::new("png");
        store.put_job(&job).unwrap();
        let loaded = store.get_job(&job.job_id).unwrap();
        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.status, JobStatus::Pending);
    }

    #[test]
    fn get_missing_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(matches!(
            store.get_job("job_missing"),
            Err(DetectError::JobNotFound(_))
        ));
    }

    #[test]
    fn cancel_pending_job() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let job = Job::new("png");
        store.put_job(&job).unwrap();
        let cancelled = store.cancel_job(&job.job_id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(
            store.get_job(&job.job_id).unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[test]
    fn cancel_terminal_job_fails() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut job = Job::new("png");
        job.update_status(JobStatus::Completed, None);
        store.put_job(&job).unwrap();
        assert!(matches!(
            store.cancel_job(&job.job_id),
            Err(DetectError::JobAlreadyFinished { .. })
        ));
    }

    #[test]
    fn second_cancel_fails() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let job = Job::new("png");
        store.put_job(&job).unwrap();
        store.cancel_job(&job.job_id).unwrap();
        assert!(matches!(
            store.cancel_job(&job.job_id),
            Err(DetectError::JobAlreadyFinished { .. })
        ));
    }

    #[test]
    fn failed_update_leaves_job_untouched() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let job = Job::new("png");
        store.put_job(&job).unwrap();
        let err = store.update_job(&job.job_id, |_| {
            Err(DetectError::InvalidRequest("nope".into()))
        });
        assert!(err.is_err());
        assert_eq!(store.get_job(&job.job_id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn delete_job_reports_existence() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let job = Job::new("png");
        store.put_job(&job).unwrap();
        assert!(store.delete_job(&job.job_id).unwrap());
        assert!(!store.delete_job(&job.job_id).unwrap());
    }

    #[test]
    fn feedback_scoped_per_job() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let fb_a1 = Feedback::new("job_a", FeedbackKind::Correct, None, None);
        let fb_a2 = Feedback::new("job_a", FeedbackKind::Partial, None, None);
        let fb_b = Feedback::new("job_b", FeedbackKind::Correct, None, None);
        store.put_feedback(&fb_a1).unwrap();
        store.put_feedback(&fb_a2).unwrap();
        store.put_feedback(&fb_b).unwrap();

        let for_a = store.feedback_for_job("job_a").unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|f| f.job_id == "job_a"));
        assert_eq!(store.feedback_for_job("job_b").unwrap().len(), 1);
        assert!(store.feedback_for_job("job_c").unwrap().is_empty());
    }

    #[test]
    fn preview_cache_hit_and_miss() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.get_cached_preview("hash1", "1.0.0").unwrap().is_none());

        store
            .store_cached_preview("hash1", "1.0.0", &preview_result("job_1"), 3600)
            .unwrap();
        let hit = store.get_cached_preview("hash1", "1.0.0").unwrap();
        assert_eq!(hit.unwrap().job_id, "job_1");

        // Different model version is a different key.
        assert!(store.get_cached_preview("hash1", "2.0.0").unwrap().is_none());
    }

    #[test]
    fn expired_preview_reads_as_miss() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .store_cached_preview("hash1", "1.0.0", &preview_result("job_1"), 0)
            .unwrap();
        assert!(store.get_cached_preview("hash1", "1.0.0").unwrap().is_none());
        // Entry was purged; still a miss afterwards.
        assert!(store.get_cached_preview("hash1", "1.0.0").unwrap().is_none());
    }
}
