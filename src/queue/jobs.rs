//! Crawl and batch job records
//!
//! A job is stored as one JSON payload plus the indexed columns the queue
//! needs (kind, status, attempts, cancellation flag). The payload is the
//! snapshot callers see when they poll.

use crate::extract::CrawlResult;
use crate::options::ScrapeOptions;
use crate::state::JobStatus;
use crate::storage::{JobKind, JobRecord, JobStore, SqliteStorage};
use crate::ArwError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle fields shared by every job kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub id: String,
    pub status: JobStatus,
    /// 0 to 100
    pub progress: u8,
    /// Last job-level error
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once, when the job reaches a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobMeta {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Moves to `status`, freezing `completedAt` on the first terminal state
    pub fn transition(&mut self, status: JobStatus) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    pub fn set_progress(&mut self, done: usize, total: usize) {
        self.progress = percent(done, total);
        self.updated_at = Utc::now();
    }
}

impl Default for JobMeta {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// A job the queue can persist and run
pub trait Job: Serialize + DeserializeOwned + Send + 'static {
    const KIND: JobKind;

    fn meta(&self) -> &JobMeta;
    fn meta_mut(&mut self) -> &mut JobMeta;

    /// Drops partial output before a fresh attempt
    fn reset_results(&mut self);

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn status(&self) -> JobStatus {
        self.meta().status
    }
}

/// One breadth-first crawl from a seed URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub url: String,
    pub options: ScrapeOptions,
    /// Results in breadth-first order
    pub results: Vec<CrawlResult>,
}

impl CrawlJob {
    pub fn new(url: String, options: ScrapeOptions) -> Self {
        Self {
            meta: JobMeta::new(),
            url,
            options,
            results: Vec::new(),
        }
    }
}

impl Job for CrawlJob {
    const KIND: JobKind = JobKind::Crawl;

    fn meta(&self) -> &JobMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut JobMeta {
        &mut self.meta
    }

    fn reset_results(&mut self) {
        self.results.clear();
        self.meta.progress = 0;
    }
}

/// Independent scrapes of a list of URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub urls: Vec<String>,
    pub options: ScrapeOptions,
    /// Successful scrapes keyed by requested URL
    pub results: BTreeMap<String, CrawlResult>,
    /// Failures keyed by requested URL
    pub errors: BTreeMap<String, String>,
}

impl BatchJob {
    pub fn new(urls: Vec<String>, options: ScrapeOptions) -> Self {
        Self {
            meta: JobMeta::new(),
            urls,
            options,
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    /// URLs that have either a result or an error
    pub fn finished_count(&self) -> usize {
        self.results.len() + self.errors.len()
    }
}

impl Job for BatchJob {
    const KIND: JobKind = JobKind::Batch;

    fn meta(&self) -> &JobMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut JobMeta {
        &mut self.meta
    }

    fn reset_results(&mut self) {
        self.results.clear();
        self.errors.clear();
        self.meta.progress = 0;
    }
}

/// Writes a new job to the store
pub fn insert_job<J: Job>(storage: &mut SqliteStorage, job: &J) -> crate::Result<()> {
    let meta = job.meta();
    let record = JobRecord {
        id: meta.id.clone(),
        kind: J::KIND,
        status: meta.status,
        payload: serde_json::to_string(job)?,
        cancel_requested: false,
        attempts: meta.attempts,
        created_at: meta.created_at.to_rfc3339(),
        updated_at: meta.updated_at.to_rfc3339(),
    };
    storage.insert_job(&record)?;
    Ok(())
}

/// Reads a job of kind `J`
///
/// Returns `None` when no job has this ID or it belongs to the other queue.
pub fn load_job<J: Job>(storage: &SqliteStorage, id: &str) -> crate::Result<Option<J>> {
    let Some(record) = storage.get_job(id)? else {
        return Ok(None);
    };
    if record.kind != J::KIND {
        return Ok(None);
    }

    let mut job: J = serde_json::from_str(&record.payload)?;
    // The indexed columns are authoritative
    let meta = job.meta_mut();
    meta.status = record.status;
    meta.attempts = record.attempts;
    Ok(Some(job))
}

/// Writes the job's current snapshot
pub fn save_job<J: Job>(storage: &mut SqliteStorage, job: &J) -> crate::Result<()> {
    let payload = serde_json::to_string(job)?;
    storage.update_job(job.id(), job.status(), &payload)?;
    Ok(())
}

/// Loads a job or fails with `JobNotFound`
pub fn require_job<J: Job>(storage: &SqliteStorage, id: &str) -> crate::Result<J> {
    load_job(storage, id)?.ok_or_else(|| ArwError::JobNotFound(id.to_string()))
}
