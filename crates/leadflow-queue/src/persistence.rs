//! SQLite-backed persistence for queue jobs.
//!
//! The single source of truth for job state: every state change is written
//! through, and queues reload their jobs on open, so queued work survives
//! restarts. One database is shared by all queues; rows carry the queue
//! name.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use leadflow_core::{LeadflowError, Result};

use crate::job::{Job, JobState};

/// Shared SQLite store backing all job queues.
pub struct QueueDb {
    conn: Mutex<Connection>,
}

impl QueueDb {
    /// Open or create the queue database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| LeadflowError::Store(format!("DB open: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LeadflowError::Store(format!("DB open: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS queue_jobs (
                id TEXT PRIMARY KEY,
                queue TEXT NOT NULL,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,          -- JSON
                state TEXT NOT NULL,            -- waiting, delayed, active, completed, failed
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                created_at TEXT NOT NULL,
                run_at TEXT NOT NULL,
                finished_at TEXT,
                last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_queue_jobs_queue ON queue_jobs(queue);
         ",
            )
            .map_err(|e| LeadflowError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Save (insert or replace) one job.
    pub fn save_job(&self, queue: &str, job: &Job) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT OR REPLACE INTO queue_jobs
                 (id, queue, key, payload, state, attempts, max_attempts,
                  created_at, run_at, finished_at, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    job.id,
                    queue,
                    job.key,
                    job.payload.to_string(),
                    job.state.as_str(),
                    job.attempts,
                    job.max_attempts,
                    job.created_at.to_rfc3339(),
                    job.run_at.to_rfc3339(),
                    job.finished_at.map(|t| t.to_rfc3339()),
                    job.last_error,
                ],
            )
            .map_err(|e| LeadflowError::Store(format!("Save job: {e}")))?;
        Ok(())
    }

    /// Delete one job row.
    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM queue_jobs WHERE id = ?1", [job_id])
            .map_err(|e| LeadflowError::Store(format!("Delete job: {e}")))?;
        Ok(())
    }

    /// Load all jobs for one queue.
    pub fn load_jobs(&self, queue: &str) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, key, payload, state, attempts, max_attempts,
                        created_at, run_at, finished_at, last_error
                 FROM queue_jobs WHERE queue = ?1",
            )
            .map_err(|e| LeadflowError::Store(format!("Load jobs: {e}")))?;

        let rows = stmt
            .query_map([queue], |row| {
                let payload: String = row.get(2)?;
                let state: String = row.get(3)?;
                let created_at: String = row.get(6)?;
                let run_at: String = row.get(7)?;
                let finished_at: Option<String> = row.get(8)?;
                Ok(Job {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    payload: serde_json::from_str(&payload)
                        .unwrap_or(serde_json::Value::Null),
                    state: JobState::parse(&state).unwrap_or(JobState::Waiting),
                    attempts: row.get(4)?,
                    max_attempts: row.get(5)?,
                    created_at: parse_ts(&created_at),
                    run_at: parse_ts(&run_at),
                    finished_at: finished_at.as_deref().map(parse_ts),
                    last_error: row.get(9)?,
                })
            })
            .map_err(|e| LeadflowError::Store(format!("Load jobs: {e}")))?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(|e| LeadflowError::Store(format!("Load jobs: {e}")))?);
        }
        Ok(jobs)
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
