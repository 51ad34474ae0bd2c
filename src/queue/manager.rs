//! Queue Manager: durable job queues drained by bounded worker pools
//!
//! Job ids travel over an in-process channel to a dispatcher per queue; the
//! dispatcher hands each id to a worker once a pool permit is free. All job
//! state lives in the store, so callers poll snapshots and nothing else
//! holds a copy.

use crate::config::{Config, CrawlerConfig, QueueConfig};
use crate::crawler::{CrawlObserver, CrawlOrchestrator, PageScraper};
use crate::extract::CrawlResult;
use crate::options::ScrapeOptions;
use crate::queue::jobs::{insert_job, load_job, require_job, save_job, BatchJob, CrawlJob, Job};
use crate::state::JobStatus;
use crate::storage::{lock, JobKind, JobStore, SharedStorage};
use crate::url::parse_input_url;
use crate::ArwError;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// What `cancel` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelOutcome {
    /// The job was still pending and has been deleted
    Removed,
    /// The job is running and will stop at its next checkpoint
    Requested,
    /// The job had already finished; nothing changed
    AlreadyFinished,
}

/// Job counts per status for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub crawl: QueueCounts,
    pub batch: QueueCounts,
}

/// How often a job waiting to retry checks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Delay before attempt `attempt + 1`: `base * 2^(attempt - 1)`
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(1u64 << exponent))
}

pub struct QueueManager {
    inner: Arc<QueueInner>,
    crawl_tx: mpsc::UnboundedSender<String>,
    batch_tx: mpsc::UnboundedSender<String>,
}

struct QueueInner {
    storage: SharedStorage,
    orchestrator: Arc<CrawlOrchestrator>,
    scraper: Arc<PageScraper>,
    crawler: CrawlerConfig,
    retry: QueueConfig,
}

impl QueueManager {
    /// Starts both dispatchers and re-enqueues unfinished jobs from the store
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        storage: SharedStorage,
        orchestrator: Arc<CrawlOrchestrator>,
        scraper: Arc<PageScraper>,
        config: &Config,
    ) -> crate::Result<Self> {
        let inner = Arc::new(QueueInner {
            storage,
            orchestrator,
            scraper,
            crawler: config.crawler.clone(),
            retry: config.queue.clone(),
        });

        let (crawl_tx, crawl_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        let crawl_workers = config.crawler.max_concurrent_requests.max(1) as usize;
        tokio::spawn(dispatch(Arc::clone(&inner), JobKind::Crawl, crawl_rx, crawl_workers));
        // A batch parallelizes its own URLs
        tokio::spawn(dispatch(Arc::clone(&inner), JobKind::Batch, batch_rx, 1));

        let manager = Self {
            inner,
            crawl_tx,
            batch_tx,
        };
        manager.recover()?;
        Ok(manager)
    }

    fn recover(&self) -> crate::Result<()> {
        let unfinished = [JobStatus::Pending, JobStatus::Processing];
        for kind in [JobKind::Crawl, JobKind::Batch] {
            let ids = lock(&self.inner.storage)?.job_ids_by_status(kind, &unfinished)?;
            if !ids.is_empty() {
                tracing::info!(kind = kind.to_db_string(), count = ids.len(), "Recovering unfinished jobs");
            }
            for id in ids {
                self.enqueue(kind, id);
            }
        }
        Ok(())
    }

    fn enqueue(&self, kind: JobKind, id: String) {
        let tx = match kind {
            JobKind::Crawl => &self.crawl_tx,
            JobKind::Batch => &self.batch_tx,
        };
        if tx.send(id).is_err() {
            // Stays pending in the store and is picked up on the next start
            tracing::error!(kind = kind.to_db_string(), "Dispatcher is gone; job left pending");
        }
    }

    /// Validates and queues a crawl; returns the job ID immediately
    pub fn submit_crawl(&self, url: &str, options: ScrapeOptions) -> crate::Result<String> {
        let seed = parse_input_url(url)?;
        options.validate()?;

        let job = CrawlJob::new(seed.to_string(), options);
        insert_job(&mut *lock(&self.inner.storage)?, &job)?;

        let id = job.meta.id;
        tracing::info!(job_id = %id, url = %seed, "Crawl job submitted");
        self.enqueue(JobKind::Crawl, id.clone());
        Ok(id)
    }

    /// Validates and queues a batch; returns the job ID immediately
    ///
    /// Duplicate URLs (after normalization) are scraped once.
    pub fn submit_batch(&self, urls: &[String], options: ScrapeOptions) -> crate::Result<String> {
        if urls.is_empty() {
            return Err(ArwError::Validation("batch requires at least one URL".to_string()));
        }
        options.validate()?;

        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(urls.len());
        for url in urls {
            let parsed = parse_input_url(url)?.to_string();
            if seen.insert(parsed.clone()) {
                normalized.push(parsed);
            }
        }

        let job = BatchJob::new(normalized, options);
        insert_job(&mut *lock(&self.inner.storage)?, &job)?;

        let id = job.meta.id;
        tracing::info!(job_id = %id, urls = job.urls.len(), "Batch job submitted");
        self.enqueue(JobKind::Batch, id.clone());
        Ok(id)
    }

    /// Current snapshot of a job
    ///
    /// # Errors
    ///
    /// * `ArwError::JobNotFound` - unknown ID, a removed job, or a job of the
    ///   other kind
    pub fn status<J: Job>(&self, id: &str) -> crate::Result<J> {
        require_job(&*lock(&self.inner.storage)?, id)
    }

    /// Cancels a job of either kind
    pub fn cancel(&self, id: &str) -> crate::Result<CancelOutcome> {
        let mut storage = lock(&self.inner.storage)?;
        let record = storage
            .get_job(id)?
            .ok_or_else(|| ArwError::JobNotFound(id.to_string()))?;

        let outcome = match record.status {
            JobStatus::Pending => {
                storage.delete_job(id)?;
                CancelOutcome::Removed
            }
            JobStatus::Processing => {
                storage.request_cancel(id)?;
                CancelOutcome::Requested
            }
            _ => CancelOutcome::AlreadyFinished,
        };

        tracing::info!(job_id = %id, outcome = ?outcome, "Cancel requested");
        Ok(outcome)
    }

    pub fn stats(&self) -> crate::Result<QueueStats> {
        let storage = lock(&self.inner.storage)?;
        let counts = |kind: JobKind| -> crate::Result<QueueCounts> {
            let by_status = storage.count_jobs_by_status(kind)?;
            let get = |status: JobStatus| by_status.get(&status).copied().unwrap_or(0);
            Ok(QueueCounts {
                pending: get(JobStatus::Pending),
                processing: get(JobStatus::Processing),
                completed: get(JobStatus::Completed),
                failed: get(JobStatus::Failed),
                cancelled: get(JobStatus::Cancelled),
            })
        };

        Ok(QueueStats {
            crawl: counts(JobKind::Crawl)?,
            batch: counts(JobKind::Batch)?,
        })
    }
}

async fn dispatch(
    inner: Arc<QueueInner>,
    kind: JobKind,
    mut rx: mpsc::UnboundedReceiver<String>,
    workers: usize,
) {
    let permits = Arc::new(Semaphore::new(workers));

    while let Some(id) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            // Runs in its own task so a panic still reaches the cleanup below
            let runner = {
                let inner = Arc::clone(&inner);
                let id = id.clone();
                tokio::spawn(async move {
                    match kind {
                        JobKind::Crawl => inner.run_job::<CrawlJob>(&id).await,
                        JobKind::Batch => inner.run_job::<BatchJob>(&id).await,
                    }
                })
            };

            let failure = match runner.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("worker task aborted: {}", e)),
            };
            if let Some(reason) = failure {
                tracing::error!(job_id = %id, error = %reason, "Job bookkeeping failed");
                let message = ArwError::JobFailure {
                    job_id: id.clone(),
                    message: reason,
                }
                .to_string();
                let marked = match kind {
                    JobKind::Crawl => fail_unfinished::<CrawlJob>(&inner.storage, &id, &message),
                    JobKind::Batch => fail_unfinished::<BatchJob>(&inner.storage, &id, &message),
                };
                if let Err(e) = marked {
                    tracing::error!(job_id = %id, error = %e, "Could not mark job failed");
                }
            }
            drop(permit);
        });
    }

    tracing::debug!(kind = kind.to_db_string(), "Dispatcher stopped");
}

/// Moves a job that is not yet finished to `failed`
///
/// Used when a worker could not record the outcome itself. If the payload
/// cannot be read back, only the status column changes.
fn fail_unfinished<J: Job>(storage: &SharedStorage, id: &str, message: &str) -> crate::Result<()> {
    let mut storage = lock(storage)?;
    match load_job::<J>(&storage, id) {
        Ok(Some(mut job)) => {
            if job.status().is_terminal() {
                return Ok(());
            }
            let meta = job.meta_mut();
            meta.error = Some(message.to_string());
            meta.transition(JobStatus::Failed);
            save_job(&mut storage, &job)
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::warn!(job_id = %id, error = %e, "Job payload unreadable, failing by status only");
            let Some(record) = storage.get_job(id)? else {
                return Ok(());
            };
            if !record.status.is_terminal() {
                storage.update_job(id, JobStatus::Failed, &record.payload)?;
            }
            Ok(())
        }
    }
}

impl QueueInner {
    /// Runs a job through its attempts until it reaches a terminal state
    async fn run_job<J: Job>(&self, id: &str) -> crate::Result<()> {
        if !self.claim::<J>(id)? {
            return Ok(());
        }

        loop {
            let attempt = self.begin_attempt::<J>(id)?;
            tracing::info!(job_id = %id, attempt, "Running job");

            let outcome = match J::KIND {
                JobKind::Crawl => self.attempt_crawl(id).await,
                JobKind::Batch => self.attempt_batch(id).await,
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = backoff_delay(self.retry.backoff_base, attempt);
                    tracing::warn!(
                        job_id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job attempt failed, retrying"
                    );
                    if self.backoff(id, delay).await? {
                        return self.finish::<J>(id, JobStatus::Cancelled, None);
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %id, attempt, error = %e, "Job failed");
                    let message = ArwError::JobFailure {
                        job_id: id.to_string(),
                        message: e.to_string(),
                    };
                    return self.finish::<J>(id, JobStatus::Failed, Some(message.to_string()));
                }
            }
        }
    }

    /// Moves a pending job to processing
    ///
    /// Returns false if the job was removed, already finished, or cancelled
    /// before it started.
    fn claim<J: Job>(&self, id: &str) -> crate::Result<bool> {
        let mut storage = lock(&self.storage)?;
        let Some(mut job) = load_job::<J>(&storage, id)? else {
            tracing::debug!(job_id = %id, "Job removed before it started");
            return Ok(false);
        };
        if job.status().is_terminal() {
            return Ok(false);
        }

        if storage.is_cancel_requested(id)? {
            job.meta_mut().transition(JobStatus::Cancelled);
            save_job(&mut storage, &job)?;
            return Ok(false);
        }

        job.meta_mut().transition(JobStatus::Processing);
        save_job(&mut storage, &job)?;
        Ok(true)
    }

    fn begin_attempt<J: Job>(&self, id: &str) -> crate::Result<u32> {
        let mut storage = lock(&self.storage)?;
        let attempt = storage.increment_attempts(id)?;
        let mut job: J = require_job(&storage, id)?;
        job.reset_results();
        job.meta_mut().attempts = attempt;
        save_job(&mut storage, &job)?;
        Ok(attempt)
    }

    fn finish<J: Job>(&self, id: &str, status: JobStatus, error: Option<String>) -> crate::Result<()> {
        let mut storage = lock(&self.storage)?;
        let mut job: J = require_job(&storage, id)?;
        let meta = job.meta_mut();
        if status == JobStatus::Completed {
            meta.progress = 100;
        }
        meta.error = error;
        meta.transition(status);
        save_job(&mut storage, &job)?;

        tracing::info!(job_id = %id, status = %status, "Job finished");
        Ok(())
    }

    fn cancel_requested(&self, id: &str) -> crate::Result<bool> {
        Ok(lock(&self.storage)?.is_cancel_requested(id)?)
    }

    /// Waits out a retry delay; returns true as soon as a cancel is requested
    async fn backoff(&self, id: &str, delay: Duration) -> crate::Result<bool> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = &mut sleep => return self.cancel_requested(id),
                _ = poll.tick() => {
                    if self.cancel_requested(id)? {
                        tracing::debug!(job_id = %id, "Cancelled during retry backoff");
                        return Ok(true);
                    }
                }
            }
        }
    }

    async fn attempt_crawl(&self, id: &str) -> crate::Result<()> {
        let job: CrawlJob = require_job(&*lock(&self.storage)?, id)?;
        let seed = parse_input_url(&job.url)?;
        let options = job.options.clone();

        let mut observer = JobObserver {
            storage: Arc::clone(&self.storage),
            max_pages: options.effective_max_pages(&self.crawler) as usize,
            job,
        };
        let summary = self
            .orchestrator
            .crawl(&seed, &options, &mut observer)
            .await?;

        let status = if summary.cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        self.finish::<CrawlJob>(id, status, None)
    }

    async fn attempt_batch(&self, id: &str) -> crate::Result<()> {
        let mut job: BatchJob = require_job(&*lock(&self.storage)?, id)?;
        let options = job.options.clone();
        let total = job.urls.len();
        let concurrency = self.crawler.max_concurrent_requests.max(1) as usize;

        let scraper = &self.scraper;
        let options_ref = &options;
        let mut scrapes = futures::stream::iter(job.urls.clone())
            .map(|url| async move {
                let outcome = match parse_input_url(&url) {
                    Ok(parsed) => scraper.scrape(&parsed, options_ref).await,
                    Err(e) => Err(e),
                };
                (url, outcome)
            })
            .buffer_unordered(concurrency);

        let mut cancelled = false;
        while let Some((url, outcome)) = scrapes.next().await {
            match outcome {
                Ok(result) => {
                    job.results.insert(url, result);
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, url = %url, error = %e, "Batch item failed");
                    job.errors.insert(url, e.to_string());
                }
            }
            job.meta.set_progress(job.finished_count(), total);

            let mut storage = lock(&self.storage)?;
            save_job(&mut storage, &job)?;
            if storage.is_cancel_requested(id)? {
                cancelled = true;
                break;
            }
        }
        drop(scrapes);

        let status = if cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        tracing::info!(
            job_id = %id,
            succeeded = job.results.len(),
            failed = job.errors.len(),
            "Batch finished"
        );
        self.finish::<BatchJob>(id, status, None)
    }
}

/// Persists crawl results as they arrive and relays cancellation
struct JobObserver {
    storage: SharedStorage,
    job: CrawlJob,
    max_pages: usize,
}

impl CrawlObserver for JobObserver {
    fn is_cancelled(&mut self) -> bool {
        match lock(&self.storage).and_then(|s| s.is_cancel_requested(&self.job.meta.id)) {
            Ok(requested) => requested,
            Err(e) => {
                tracing::warn!(job_id = %self.job.meta.id, error = %e, "Could not read cancel flag");
                false
            }
        }
    }

    fn on_result(&mut self, result: &CrawlResult) -> crate::Result<()> {
        self.job.results.push(result.clone());
        self.job
            .meta
            .set_progress(self.job.results.len(), self.max_pages);
        save_job(&mut *lock(&self.storage)?, &self.job)
    }
}
