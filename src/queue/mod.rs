//! Durable crawl and batch job queues
//!
//! This module contains the Queue Manager and the job records it owns:
//! - Submission with synchronous validation
//! - Bounded worker pools per queue with retry and exponential backoff
//! - Incremental progress, cancellation, and recovery after restart

mod jobs;
mod manager;

pub use jobs::{insert_job, load_job, save_job, BatchJob, CrawlJob, Job, JobMeta};
pub use manager::{backoff_delay, CancelOutcome, QueueCounts, QueueManager, QueueStats};
