//! Storage module for durable state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Crawl and batch job persistence for the Queue Manager
//! - The shared tier of the discovery/page cache

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{CacheStore, JobStore, StorageError, StorageResult};

use crate::state::JobStatus;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between the queue workers and the cache
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
///
/// `:memory:` opens a private in-memory database.
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SharedStorage)` - Successfully initialized storage
/// * `Err(ArwError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> crate::Result<SharedStorage> {
    let storage = if path.as_os_str() == ":memory:" {
        SqliteStorage::open_in_memory()?
    } else {
        SqliteStorage::new(path)?
    };
    Ok(Arc::new(Mutex::new(storage)))
}

/// Locks the shared storage, mapping poisoning to a storage error
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// The two independent job queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Crawl,
    Batch,
}

impl JobKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Batch => "batch",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "crawl" => Some(Self::Crawl),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

/// Represents a job row in the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// JSON body of the job
    pub payload: String,
    pub cancel_requested: bool,
    pub attempts: u32,
    pub created_at: String,
    pub updated_at: String,
}
