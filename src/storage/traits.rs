//! Storage traits and error types
//!
//! This module defines the trait interfaces for storage backends and
//! associated error types. The Queue Manager owns the job store exclusively;
//! the cache owns the cache store.

use crate::state::JobStatus;
use crate::storage::{JobKind, JobRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable job records
pub trait JobStore {
    /// Inserts a new job record
    fn insert_job(&mut self, record: &JobRecord) -> StorageResult<()>;

    /// Gets a job by ID
    fn get_job(&self, id: &str) -> StorageResult<Option<JobRecord>>;

    /// Writes a new status and payload for a job
    ///
    /// Rejects transitions that would move the job backwards, which also
    /// makes writes to a job that already reached a terminal state fail.
    ///
    /// # Arguments
    ///
    /// * `id` - Job identifier
    /// * `status` - The new status
    /// * `payload` - The serialized job body
    fn update_job(&mut self, id: &str, status: JobStatus, payload: &str) -> StorageResult<()>;

    /// Records that another attempt is starting and returns the attempt number
    fn increment_attempts(&mut self, id: &str) -> StorageResult<u32>;

    /// Removes a job outright
    ///
    /// Returns true if a row was deleted.
    fn delete_job(&mut self, id: &str) -> StorageResult<bool>;

    /// Flags a job for cooperative cancellation
    fn request_cancel(&mut self, id: &str) -> StorageResult<()>;

    /// Returns true if cancellation was requested for the job
    fn is_cancel_requested(&self, id: &str) -> StorageResult<bool>;

    /// Gets the IDs of jobs of a kind in any of the given states, oldest first
    fn job_ids_by_status(&self, kind: JobKind, statuses: &[JobStatus])
        -> StorageResult<Vec<String>>;

    /// Counts jobs of a kind per status
    fn count_jobs_by_status(&self, kind: JobKind) -> StorageResult<HashMap<JobStatus, u64>>;
}

/// Shared tier of the two-tier cache
///
/// Times are milliseconds since the Unix epoch.
pub trait CacheStore {
    /// Gets a value that has not expired at `now_ms`
    fn cache_get(&self, key: &str, now_ms: i64) -> StorageResult<Option<(String, i64)>>;

    /// Inserts or replaces a value (last write wins)
    fn cache_put(&mut self, key: &str, value: &str, expires_at_ms: i64) -> StorageResult<()>;

    /// Removes one key
    fn cache_delete(&mut self, key: &str) -> StorageResult<()>;

    /// Removes every entry
    fn cache_clear(&mut self) -> StorageResult<u64>;

    /// Deletes expired entries and returns how many were removed
    fn purge_expired(&mut self, now_ms: i64) -> StorageResult<u64>;

    /// Counts live entries
    fn cache_count(&self, now_ms: i64) -> StorageResult<u64>;
}
