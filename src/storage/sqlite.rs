//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore and
//! CacheStore traits.

use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CacheStore, JobStore, StorageError, StorageResult};
use crate::storage::{JobKind, JobRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ArwError)` - Failed to open database
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn current_status(&self, id: &str) -> StorageResult<JobStatus> {
        let status: Option<String> = self
            .conn
            .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;

        let status = status.ok_or_else(|| StorageError::JobNotFound(id.to_string()))?;
        JobStatus::from_db_string(&status)
            .ok_or_else(|| StorageError::Database(format!("Unknown job status '{}'", status)))
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let kind: String = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(JobRecord {
        id: row.get(0)?,
        kind: JobKind::from_db_string(&kind).unwrap_or(JobKind::Crawl),
        status: JobStatus::from_db_string(&status).unwrap_or(JobStatus::Failed),
        payload: row.get(3)?,
        cancel_requested: row.get::<_, i64>(4)? != 0,
        attempts: row.get::<_, i64>(5)? as u32,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl JobStore for SqliteStorage {
    fn insert_job(&mut self, record: &JobRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO jobs (id, kind, status, payload, cancel_requested, attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.kind.to_db_string(),
                record.status.to_db_string(),
                record.payload,
                record.cancel_requested as i64,
                record.attempts as i64,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> StorageResult<Option<JobRecord>> {
        let job = self
            .conn
            .query_row(
                "SELECT id, kind, status, payload, cancel_requested, attempts, created_at, updated_at
                 FROM jobs WHERE id = ?1",
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn update_job(&mut self, id: &str, status: JobStatus, payload: &str) -> StorageResult<()> {
        let current = self.current_status(id)?;
        if !current.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE jobs SET status = ?1, payload = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.to_db_string(), payload, now, id],
        )?;
        Ok(())
    }

    fn increment_attempts(&mut self, id: &str) -> StorageResult<u32> {
        let changed = self.conn.execute(
            "UPDATE jobs SET attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StorageError::JobNotFound(id.to_string()));
        }

        let attempts: i64 = self.conn.query_row(
            "SELECT attempts FROM jobs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    fn delete_job(&mut self, id: &str) -> StorageResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn request_cancel(&mut self, id: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE jobs SET cancel_requested = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StorageError::JobNotFound(id.to_string()));
        }
        Ok(())
    }

    fn is_cancel_requested(&self, id: &str) -> StorageResult<bool> {
        let flag: Option<i64> = self
            .conn
            .query_row(
                "SELECT cancel_requested FROM jobs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(0) != 0)
    }

    fn job_ids_by_status(
        &self,
        kind: JobKind,
        statuses: &[JobStatus],
    ) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, status FROM jobs WHERE kind = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![kind.to_db_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut ids = Vec::new();
        for row in rows {
            let (id, status) = row?;
            if JobStatus::from_db_string(&status).map_or(false, |s| statuses.contains(&s)) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn count_jobs_by_status(&self, kind: JobKind) -> StorageResult<HashMap<JobStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM jobs WHERE kind = ?1 GROUP BY status")?;

        let rows = stmt.query_map(params![kind.to_db_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts: HashMap<JobStatus, u64> =
            JobStatus::all().into_iter().map(|s| (s, 0)).collect();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = JobStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}

impl CacheStore for SqliteStorage {
    fn cache_get(&self, key: &str, now_ms: i64) -> StorageResult<Option<(String, i64)>> {
        let entry = self
            .conn
            .query_row(
                "SELECT value, expires_at FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now_ms],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(entry)
    }

    fn cache_put(&mut self, key: &str, value: &str, expires_at_ms: i64) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at_ms],
        )?;
        Ok(())
    }

    fn cache_delete(&mut self, key: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn cache_clear(&mut self) -> StorageResult<u64> {
        let deleted = self.conn.execute("DELETE FROM cache_entries", [])?;
        Ok(deleted as u64)
    }

    fn purge_expired(&mut self, now_ms: i64) -> StorageResult<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![now_ms],
        )?;
        Ok(deleted as u64)
    }

    fn cache_count(&self, now_ms: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1",
            params![now_ms],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
