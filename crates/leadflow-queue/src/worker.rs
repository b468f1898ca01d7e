//! Workers: pull jobs off a queue and run them through a processor,
//! bounded by a concurrency cap and a per-second rate limit.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use leadflow_core::{QueueConfig, Result};

use crate::job::Job;
use crate::queue::JobQueue;

/// One job execution. `Ok` completes the job; `Err` counts a failed
/// attempt and the queue schedules the retry.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<()>;
}

/// Fixed one-second window rate limiter. Start counts reset each window;
/// callers block until the window rolls over once the limit is hit.
struct RateWindow {
    limit: u32,
    window_start: Instant,
    count: u32,
}

impl RateWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            window_start: Instant::now(),
            count: 0,
        }
    }

    async fn acquire(&mut self) {
        loop {
            let elapsed = self.window_start.elapsed();
            if elapsed >= Duration::from_secs(1) {
                self.window_start = Instant::now();
                self.count = 0;
            }
            if self.count < self.limit {
                self.count += 1;
                return;
            }
            tokio::time::sleep(Duration::from_secs(1).saturating_sub(elapsed)).await;
        }
    }
}

/// Dispatcher for one queue. Runs until the queue is closed, then drains
/// in-flight jobs before returning.
pub struct Worker;

impl Worker {
    pub fn spawn(
        queue: Arc<JobQueue>,
        processor: Arc<dyn JobProcessor>,
        config: &QueueConfig,
    ) -> JoinHandle<()> {
        let concurrency = config.concurrency.max(1);
        let rate_limit = config.rate_limit_per_sec.max(1);
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let mut rate = RateWindow::new(rate_limit);
            tracing::info!(
                "⚙️ Worker for queue '{}' started ({} concurrent, {}/s)",
                queue.name(),
                concurrency,
                rate_limit
            );

            loop {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };

                let Some(job) = queue.next_job().await else {
                    drop(permit);
                    break;
                };
                rate.acquire().await;

                let queue = Arc::clone(&queue);
                let processor = Arc::clone(&processor);
                tokio::spawn(async move {
                    let job_id = job.id.clone();
                    match processor.process(&job).await {
                        Ok(()) => {
                            tracing::debug!(
                                "✅ Queue '{}': job {} completed (attempt {})",
                                queue.name(),
                                job_id,
                                job.attempts
                            );
                            if let Err(e) = queue.complete(&job_id).await {
                                tracing::warn!("⚙️ Complete bookkeeping failed: {}", e);
                            }
                        }
                        Err(e) => {
                            if let Err(e2) = queue.fail(&job_id, &e.to_string()).await {
                                tracing::warn!("⚙️ Fail bookkeeping failed: {}", e2);
                            }
                        }
                    }
                    drop(permit);
                });
            }

            // Queue closed; wait for in-flight jobs to finish
            let _ = semaphore.acquire_many(concurrency as u32).await;
            tracing::info!("⚙️ Worker for queue '{}' stopped", queue.name());
        })
    }
}

/// The set of running workers. Shutdown closes every queue and waits for
/// the dispatchers to drain.
#[derive(Default)]
pub struct WorkerPool {
    workers: Vec<(Arc<JobQueue>, JoinHandle<()>)>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        queue: Arc<JobQueue>,
        processor: Arc<dyn JobProcessor>,
        config: &QueueConfig,
    ) {
        let handle = Worker::spawn(Arc::clone(&queue), processor, config);
        self.workers.push((queue, handle));
    }

    /// Graceful shutdown: no new jobs start, in-flight jobs finish,
    /// pending jobs stay persisted for the next run.
    pub async fn shutdown(self) {
        for (queue, _) in &self.workers {
            queue.close().await;
        }
        for (queue, handle) in self.workers {
            if let Err(e) = handle.await {
                tracing::warn!("⚙️ Worker for queue '{}' panicked: {}", queue.name(), e);
            }
        }
        tracing::info!("⚙️ Worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EnqueueOpts;
    use leadflow_core::{LeadflowError, RetentionConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use tokio::time::timeout;

    fn config(concurrency: usize) -> QueueConfig {
        QueueConfig {
            attempts: 3,
            backoff_base_ms: 10,
            concurrency,
            rate_limit_per_sec: 1000,
        }
    }

    fn queue(config: &QueueConfig) -> Arc<JobQueue> {
        JobQueue::new("test", config, RetentionConfig::default(), None).unwrap()
    }

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobProcessor for Flaky {
        async fn process(&self, _job: &Job) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LeadflowError::Provider("transient".into()))
            } else {
                Ok(())
            }
        }
    }

    async fn wait_terminal(q: &JobQueue, id: &str) -> Job {
        for _ in 0..300 {
            if let Some(job) = q.job(id).await {
                if job.state.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn test_fail_twice_then_succeed_completes_once() {
        let cfg = config(2);
        let q = queue(&cfg);
        let processor = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let mut pool = WorkerPool::new();
        pool.start(Arc::clone(&q), processor.clone(), &cfg);

        let id = q
            .enqueue("j1", json!({}), EnqueueOpts::default())
            .await
            .unwrap();
        let job = wait_terminal(&q, &id).await;
        assert_eq!(job.state, crate::job::JobState::Completed);
        assert_eq!(job.attempts, 3);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_all_attempts_fail_lands_in_failed_set() {
        let cfg = config(2);
        let q = queue(&cfg);
        let processor = Arc::new(Flaky {
            failures: 100,
            calls: AtomicU32::new(0),
        });
        let mut pool = WorkerPool::new();
        pool.start(Arc::clone(&q), processor, &cfg);

        let id = q
            .enqueue("j1", json!({}), EnqueueOpts::default())
            .await
            .unwrap();
        let job = wait_terminal(&q, &id).await;
        assert_eq!(job.state, crate::job::JobState::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.last_error.as_deref(), Some("Provider error: transient"));

        pool.shutdown().await;
    }

    /// Tracks the in-flight high-water mark.
    struct Tracker {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobProcessor for Tracker {
        async fn process(&self, _job: &Job) -> Result<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        let cfg = config(2);
        let q = queue(&cfg);
        let processor = Arc::new(Tracker {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::new();
        pool.start(Arc::clone(&q), processor.clone(), &cfg);

        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(
                q.enqueue(&format!("j{i}"), json!({}), EnqueueOpts::default())
                    .await
                    .unwrap(),
            );
        }
        for id in &ids {
            wait_terminal(&q, id).await;
        }
        assert!(processor.peak.load(Ordering::SeqCst) <= 2);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight() {
        let cfg = config(1);
        let q = queue(&cfg);
        let processor = Arc::new(Tracker {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::new();
        pool.start(Arc::clone(&q), processor, &cfg);

        let id = q
            .enqueue("j1", json!({}), EnqueueOpts::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        timeout(Duration::from_secs(2), pool.shutdown())
            .await
            .expect("shutdown should not hang");
        // The in-flight job finished before shutdown returned
        assert_eq!(q.job(&id).await.unwrap().state, crate::job::JobState::Completed);
    }
}
