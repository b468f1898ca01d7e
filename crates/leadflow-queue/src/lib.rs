//! # Leadflow Queue
//!
//! Durable job queues and workers — the layer that performs the real
//! side effects (sending email, publishing social posts) with retries,
//! concurrency caps, rate limiting, and SQLite persistence.
//!
//! ## Architecture
//! ```text
//! producers (queue_email, queue_social_post, ...)
//!   → JobQueue ("emails" / "social-posts")
//!       ├── ready queue + delayed heap (scheduled posts, retry backoff)
//!       ├── SQLite write-through (QueueDb) — jobs survive restarts
//!       └── retention sweep for terminal jobs
//!   → Worker (concurrency cap + per-second rate limiter)
//!       ├── EmailProcessor  — resolve campaign, send via EmailSender
//!       └── SocialProcessor — load post/account, refresh OAuth token,
//!                             publish, write domain bookkeeping
//! ```
//!
//! Delivery is at-least-once: a failed attempt backs off exponentially up
//! to the attempt ceiling, then the job lands in the failed set and is
//! retained for inspection.

pub mod email_worker;
pub mod job;
pub mod persistence;
pub mod producers;
pub mod queue;
pub mod smtp;
pub mod social_worker;
pub mod worker;

pub use email_worker::{EmailJobData, EmailProcessor};
pub use job::{Job, JobState, RetryPolicy};
pub use persistence::QueueDb;
pub use producers::QueueService;
pub use queue::{EnqueueOpts, JobQueue, QueueStats};
pub use smtp::SmtpEmailSender;
pub use social_worker::SocialProcessor;
pub use worker::{JobProcessor, Worker, WorkerPool};
