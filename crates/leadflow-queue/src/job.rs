//! Job records and retry policy.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Job lifecycle. Completed and Failed are terminal; Failed means the
/// attempt ceiling was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobState::Waiting),
            "delayed" => Some(JobState::Delayed),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

/// One queued unit of work. `key` is the idempotency/domain key (the post
/// id for social jobs) used for dedup, cancel, and reschedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub key: String,
    pub payload: Value,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// When the job becomes eligible for pickup (enqueue delay or backoff).
    pub run_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(key: &str, payload: Value, max_attempts: u32, delay: Duration) -> Self {
        let now = Utc::now();
        let delayed = !delay.is_zero();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.to_string(),
            payload,
            state: if delayed {
                JobState::Delayed
            } else {
                JobState::Waiting
            },
            attempts: 0,
            max_attempts,
            created_at: now,
            run_at: now + chrono::Duration::from_std(delay).unwrap_or_default(),
            finished_at: None,
            last_error: None,
        }
    }
}

/// Exponential backoff policy: base delay doubled per failed attempt, plus
/// a little jitter so retry bursts spread out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the next attempt, given how many attempts have already
    /// run (1-based: after the first failure pass `1`).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        let jitter = rand::thread_rng().gen_range(0..250);
        self.base_delay * factor + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_job_delay_state() {
        let immediate = Job::new("k1", json!({}), 3, Duration::ZERO);
        assert_eq!(immediate.state, JobState::Waiting);

        let delayed = Job::new("k2", json!({}), 3, Duration::from_secs(60));
        assert_eq!(delayed.state, JobState::Delayed);
        assert!(delayed.run_at > Utc::now() + chrono::Duration::seconds(50));
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let first = policy.next_delay(1);
        let second = policy.next_delay(2);
        let third = policy.next_delay(3);
        // 2s, 4s, 8s plus up to 250ms jitter each
        assert!(first >= Duration::from_secs(2) && first < Duration::from_millis(2250));
        assert!(second >= Duration::from_secs(4) && second < Duration::from_millis(4250));
        assert!(third >= Duration::from_secs(8) && third < Duration::from_millis(8250));
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [
            JobState::Waiting,
            JobState::Delayed,
            JobState::Active,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("bogus"), None);
    }
}
