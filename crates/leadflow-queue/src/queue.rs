//! The job queue: ready/delayed state machine with SQLite write-through.
//!
//! Ready jobs wait in a FIFO; delayed jobs (scheduled posts, retry
//! backoff) sit in a min-heap keyed on `run_at` and get promoted when
//! due. Workers block on `next_job` until something is ready or the
//! queue is closed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use leadflow_core::{QueueConfig, Result, RetentionConfig};

use crate::job::{Job, JobState, RetryPolicy};
use crate::persistence::QueueDb;

/// Enqueue options. `dedup` makes the enqueue a no-op when a live
/// (non-terminal) job with the same key already exists.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOpts {
    pub delay: Duration,
    pub dedup: bool,
}

impl EnqueueOpts {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            dedup: false,
        }
    }

    pub fn deduped() -> Self {
        Self {
            delay: Duration::ZERO,
            dedup: true,
        }
    }
}

/// Per-state job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.waiting + self.delayed + self.active + self.completed + self.failed
    }
}

/// Min-heap entry: earliest `run_at` pops first.
struct DelayedEntry {
    run_at: DateTime<Utc>,
    job_id: String,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_at == other.run_at && self.job_id == other.job_id
    }
}

impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap behaves as a min-heap
        other
            .run_at
            .cmp(&self.run_at)
            .then_with(|| other.job_id.cmp(&self.job_id))
    }
}

struct QueueState {
    jobs: HashMap<String, Job>,
    ready: VecDeque<String>,
    delayed: BinaryHeap<DelayedEntry>,
    paused: bool,
    closed: bool,
}

/// One named durable job queue.
pub struct JobQueue {
    name: String,
    retry: RetryPolicy,
    retention: RetentionConfig,
    db: Option<Arc<QueueDb>>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl JobQueue {
    /// Create a queue, reloading any persisted jobs. Jobs that were
    /// `active` when the process died go back to `waiting` so they get
    /// retried (at-least-once delivery).
    pub fn new(
        name: &str,
        config: &QueueConfig,
        retention: RetentionConfig,
        db: Option<Arc<QueueDb>>,
    ) -> Result<Arc<Self>> {
        let mut state = QueueState {
            jobs: HashMap::new(),
            ready: VecDeque::new(),
            delayed: BinaryHeap::new(),
            paused: false,
            closed: false,
        };

        if let Some(db) = &db {
            let mut recovered = 0usize;
            for mut job in db.load_jobs(name)? {
                if job.state == JobState::Active {
                    job.state = JobState::Waiting;
                    db.save_job(name, &job)?;
                    recovered += 1;
                }
                match job.state {
                    JobState::Waiting => state.ready.push_back(job.id.clone()),
                    JobState::Delayed => state.delayed.push(DelayedEntry {
                        run_at: job.run_at,
                        job_id: job.id.clone(),
                    }),
                    _ => {}
                }
                state.jobs.insert(job.id.clone(), job);
            }
            if !state.jobs.is_empty() {
                tracing::info!(
                    "📦 Queue '{}' reloaded {} job(s), {} recovered from active",
                    name,
                    state.jobs.len(),
                    recovered
                );
            }
        }

        Ok(Arc::new(Self {
            name: name.to_string(),
            retry: RetryPolicy::new(
                config.attempts,
                Duration::from_millis(config.backoff_base_ms),
            ),
            retention,
            db,
            state: Mutex::new(state),
            notify: Notify::new(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a job. Returns the job id; with `dedup` set, returns the id of
    /// the existing live job for the same key instead of adding another.
    pub async fn enqueue(&self, key: &str, payload: Value, opts: EnqueueOpts) -> Result<String> {
        let mut state = self.state.lock().await;

        if opts.dedup {
            if let Some(existing) = state
                .jobs
                .values()
                .find(|j| j.key == key && !j.state.is_terminal())
            {
                tracing::debug!(
                    "📦 Queue '{}': dedup hit for key '{}', reusing job {}",
                    self.name,
                    key,
                    existing.id
                );
                return Ok(existing.id.clone());
            }
        }

        let job = Job::new(key, payload, self.retry.max_attempts, opts.delay);
        self.persist(&job)?;

        let id = job.id.clone();
        match job.state {
            JobState::Delayed => state.delayed.push(DelayedEntry {
                run_at: job.run_at,
                job_id: id.clone(),
            }),
            _ => state.ready.push_back(id.clone()),
        }
        state.jobs.insert(id.clone(), job);
        drop(state);

        self.notify.notify_one();
        Ok(id)
    }

    /// Add a batch of jobs. Pickup order across the batch is not
    /// guaranteed once delays and retries differ.
    pub async fn enqueue_bulk(
        &self,
        batch: Vec<(String, Value)>,
        opts: EnqueueOpts,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(batch.len());
        for (key, payload) in batch {
            ids.push(self.enqueue(&key, payload, opts.clone()).await?);
        }
        Ok(ids)
    }

    /// Pull the next ready job, marking it active and counting the
    /// attempt. Blocks until a job is ready; returns `None` once the
    /// queue is closed.
    pub async fn next_job(&self) -> Option<Job> {
        loop {
            let wait: Option<Duration>;
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return None;
                }
                if state.paused {
                    drop(state);
                    self.notify.notified().await;
                    continue;
                }

                let now = Utc::now();
                self.promote_due(&mut state, now);

                if let Some(id) = state.ready.pop_front() {
                    if let Some(job) = state.jobs.get_mut(&id) {
                        job.state = JobState::Active;
                        job.attempts += 1;
                        let snapshot = job.clone();
                        if let Err(e) = self.persist(&snapshot) {
                            tracing::warn!("📦 Queue '{}': persist failed: {}", self.name, e);
                        }
                        return Some(snapshot);
                    }
                    // Stale id (cancelled), try again
                    continue;
                }

                wait = state
                    .delayed
                    .peek()
                    .map(|e| (e.run_at - now).to_std().unwrap_or_default());
            }

            match wait {
                Some(until_due) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(until_due) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Mark a job completed and sweep retention.
    pub async fn complete(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.state = JobState::Completed;
            job.finished_at = Some(Utc::now());
            job.last_error = None;
            let snapshot = job.clone();
            self.persist(&snapshot)?;
        }
        self.sweep_retention(&mut state);
        Ok(())
    }

    /// Record a failed attempt. Re-delays with backoff while attempts
    /// remain, otherwise the job lands in the failed set.
    pub async fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(job_id) else {
            return Ok(());
        };
        job.last_error = Some(error.to_string());

        if job.attempts < job.max_attempts {
            let delay = self.retry.next_delay(job.attempts);
            job.state = JobState::Delayed;
            job.run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            let entry = DelayedEntry {
                run_at: job.run_at,
                job_id: job.id.clone(),
            };
            let snapshot = job.clone();
            tracing::warn!(
                "⚠️ Queue '{}': job {} attempt {}/{} failed ({}), retrying in {:?}",
                self.name,
                job_id,
                snapshot.attempts,
                snapshot.max_attempts,
                error,
                delay
            );
            state.delayed.push(entry);
            self.persist(&snapshot)?;
            drop(state);
            self.notify.notify_one();
        } else {
            job.state = JobState::Failed;
            job.finished_at = Some(Utc::now());
            let snapshot = job.clone();
            tracing::error!(
                "❌ Queue '{}': job {} failed permanently after {} attempts: {}",
                self.name,
                job_id,
                snapshot.attempts,
                error
            );
            self.persist(&snapshot)?;
            self.sweep_retention(&mut state);
        }
        Ok(())
    }

    /// Remove the first live, not-yet-active job with this key. Returns
    /// false when no such job exists (already running, finished, or never
    /// queued).
    pub async fn cancel(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(id) = state
            .jobs
            .values()
            .find(|j| j.key == key && matches!(j.state, JobState::Waiting | JobState::Delayed))
            .map(|j| j.id.clone())
        else {
            return Ok(false);
        };

        state.jobs.remove(&id);
        state.ready.retain(|queued| queued != &id);
        // Delayed heap entries for removed jobs are skipped lazily
        if let Some(db) = &self.db {
            db.delete_job(&id)?;
        }
        tracing::info!("📦 Queue '{}': cancelled job {} (key '{}')", self.name, id, key);
        Ok(true)
    }

    /// Snapshot of one job.
    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.state.lock().await.jobs.get(job_id).cloned()
    }

    /// Per-state counts.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for job in state.jobs.values() {
            match job.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Delayed => stats.delayed += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// All jobs currently in the given state.
    pub async fn jobs_in_state(&self, wanted: JobState) -> Vec<Job> {
        self.state
            .lock()
            .await
            .jobs
            .values()
            .filter(|j| j.state == wanted)
            .cloned()
            .collect()
    }

    /// Stop handing out jobs. Queued work is kept; producers may keep
    /// enqueueing.
    pub async fn pause(&self) {
        self.state.lock().await.paused = true;
        tracing::info!("📦 Queue '{}' paused", self.name);
    }

    /// Resume dequeuing after a pause.
    pub async fn resume(&self) {
        self.state.lock().await.paused = false;
        self.notify.notify_waiters();
        tracing::info!("📦 Queue '{}' resumed", self.name);
    }

    /// Close the queue: `next_job` returns `None` for every blocked and
    /// future caller. Pending jobs stay persisted for the next start.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
        tracing::info!("📦 Queue '{}' closed", self.name);
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    fn persist(&self, job: &Job) -> Result<()> {
        if let Some(db) = &self.db {
            db.save_job(&self.name, job)?;
        }
        Ok(())
    }

    /// Move due delayed jobs onto the ready queue. Heap entries whose job
    /// was cancelled or already moved are dropped here.
    fn promote_due(&self, state: &mut QueueState, now: DateTime<Utc>) {
        loop {
            match state.delayed.peek() {
                Some(entry) if entry.run_at <= now => {}
                _ => break,
            }
            let Some(entry) = state.delayed.pop() else {
                break;
            };
            let Some(job) = state.jobs.get_mut(&entry.job_id) else {
                continue;
            };
            if job.state != JobState::Delayed || job.run_at != entry.run_at {
                continue;
            }
            job.state = JobState::Waiting;
            let snapshot = job.clone();
            if let Err(e) = self.persist(&snapshot) {
                tracing::warn!("📦 Queue '{}': persist failed: {}", self.name, e);
            }
            state.ready.push_back(entry.job_id);
        }
    }

    /// Purge terminal jobs beyond the retention bounds (count and age,
    /// whichever trips first).
    fn sweep_retention(&self, state: &mut QueueState) {
        let now = Utc::now();
        let mut purge = Vec::new();

        for (want, keep, max_age) in [
            (
                JobState::Completed,
                self.retention.completed_keep,
                self.retention.completed_max_age_secs,
            ),
            (
                JobState::Failed,
                self.retention.failed_keep,
                self.retention.failed_max_age_secs,
            ),
        ] {
            let mut terminal: Vec<(String, DateTime<Utc>)> = state
                .jobs
                .values()
                .filter(|j| j.state == want)
                .map(|j| (j.id.clone(), j.finished_at.unwrap_or(j.created_at)))
                .collect();
            // Newest first; everything past `keep` or older than `max_age` goes
            terminal.sort_by(|a, b| b.1.cmp(&a.1));
            let cutoff = now - chrono::Duration::seconds(max_age as i64);
            for (idx, (id, finished)) in terminal.into_iter().enumerate() {
                if idx >= keep || finished < cutoff {
                    purge.push(id);
                }
            }
        }

        for id in purge {
            state.jobs.remove(&id);
            if let Some(db) = &self.db {
                if let Err(e) = db.delete_job(&id) {
                    tracing::warn!("📦 Queue '{}': purge failed: {}", self.name, e);
                }
            }
        }
    }
}
