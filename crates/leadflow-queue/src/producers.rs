//! The producer side: the API the engine handlers and the binary use to
//! put work on the queues.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use leadflow_core::{
    LeadflowError, PostStatus, RecordStore, Result, require_post,
};

use crate::email_worker::EmailJobData;
use crate::queue::{EnqueueOpts, JobQueue, QueueStats};

/// Front door for enqueueing email and social work.
pub struct QueueService {
    store: Arc<dyn RecordStore>,
    email_queue: Arc<JobQueue>,
    social_queue: Arc<JobQueue>,
}

impl QueueService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        email_queue: Arc<JobQueue>,
        social_queue: Arc<JobQueue>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            email_queue,
            social_queue,
        })
    }

    /// Queue one email for delivery. Returns the job id.
    pub async fn queue_email(&self, data: EmailJobData) -> Result<String> {
        let key = match &data.campaign_id {
            Some(campaign) => format!("{}:{}", data.to, campaign),
            None => data.to.clone(),
        };
        let payload = serde_json::to_value(&data)
            .map_err(|e| LeadflowError::Queue(format!("Serialize email job: {e}")))?;
        let id = self
            .email_queue
            .enqueue(&key, payload, EnqueueOpts::default())
            .await?;
        tracing::info!("📧 Queued email to {} (job {})", data.to, id);
        Ok(id)
    }

    /// Queue a batch of emails, e.g. one campaign send to many leads.
    pub async fn queue_bulk_emails(&self, batch: Vec<EmailJobData>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(batch.len());
        for data in batch {
            ids.push(self.queue_email(data).await?);
        }
        tracing::info!("📧 Queued {} email(s)", ids.len());
        Ok(ids)
    }

    /// Queue a post for publishing. A post scheduled in the future gets a
    /// delayed job; queueing is deduped on the post id, so calling this
    /// twice for the same pending post returns the same job. A draft
    /// moves to scheduled.
    pub async fn queue_social_post(&self, post_id: &str) -> Result<String> {
        let mut post = require_post(self.store.as_ref(), post_id).await?;
        if !post.is_publishable() {
            return Err(LeadflowError::Queue(format!(
                "post {post_id} is {:?}, not queueable",
                post.status
            )));
        }

        let delay = delay_until(post.scheduled_at);
        if post.status == PostStatus::Draft {
            post.status = PostStatus::Scheduled;
            self.store.update_post(post.clone()).await?;
        }

        let opts = EnqueueOpts {
            delay,
            dedup: true,
        };
        let id = self
            .social_queue
            .enqueue(post_id, serde_json::json!({"postId": post_id}), opts)
            .await?;
        tracing::info!(
            "🔔 Queued post {} for {} (job {})",
            post_id,
            post.scheduled_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "now".into()),
            id
        );
        Ok(id)
    }

    /// Queue a batch of posts by id. Pickup order across the batch is not
    /// guaranteed.
    pub async fn queue_bulk_social_posts(&self, post_ids: &[String]) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(post_ids.len());
        for post_id in post_ids {
            ids.push(self.queue_social_post(post_id).await?);
        }
        tracing::info!("🔔 Queued {} post(s)", ids.len());
        Ok(ids)
    }

    /// Queue every pending (draft or scheduled) post in the store. Dedup
    /// makes this safe to call repeatedly, e.g. at startup.
    pub async fn queue_pending_posts(&self) -> Result<Vec<String>> {
        let posts = self.store.scheduled_posts().await?;
        let mut ids = Vec::with_capacity(posts.len());
        for post in posts {
            ids.push(self.queue_social_post(&post.id).await?);
        }
        Ok(ids)
    }

    /// Cancel the pending job for a post. Returns false when nothing was
    /// pending (already publishing, published, or never queued). The post
    /// itself goes back to draft.
    pub async fn cancel_social_post(&self, post_id: &str) -> Result<bool> {
        let cancelled = self.social_queue.cancel(post_id).await?;
        if cancelled {
            let mut post = require_post(self.store.as_ref(), post_id).await?;
            post.status = PostStatus::Draft;
            self.store.update_post(post).await?;
        }
        Ok(cancelled)
    }

    /// Move a pending post to a new publish time: cancel the old job,
    /// update the record, queue a fresh job against the updated record.
    pub async fn reschedule_social_post(
        &self,
        post_id: &str,
        publish_at: DateTime<Utc>,
    ) -> Result<String> {
        self.social_queue.cancel(post_id).await?;

        let mut post = require_post(self.store.as_ref(), post_id).await?;
        if post.status == PostStatus::Published {
            return Err(LeadflowError::Queue(format!(
                "post {post_id} already published"
            )));
        }
        post.scheduled_at = Some(publish_at);
        post.status = PostStatus::Scheduled;
        self.store.update_post(post).await?;

        self.queue_social_post(post_id).await
    }

    pub async fn email_stats(&self) -> QueueStats {
        self.email_queue.stats().await
    }

    pub async fn social_stats(&self) -> QueueStats {
        self.social_queue.stats().await
    }

    /// Posts still waiting to publish, for dashboards.
    pub async fn scheduled_posts(&self) -> Result<Vec<leadflow_core::SocialPost>> {
        self.store.scheduled_posts().await
    }
}

/// Delay from now until the scheduled time, floored at zero. A post with
/// no schedule (or one in the past) publishes immediately.
fn delay_until(scheduled_at: Option<DateTime<Utc>>) -> Duration {
    scheduled_at
        .and_then(|at| (at - Utc::now()).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use leadflow_core::{MemoryStore, QueueConfig, RetentionConfig, SocialPost};

    fn fast_config() -> QueueConfig {
        QueueConfig {
            attempts: 3,
            backoff_base_ms: 10,
            concurrency: 2,
            rate_limit_per_sec: 100,
        }
    }

    fn post(id: &str, status: PostStatus, scheduled_at: Option<DateTime<Utc>>) -> SocialPost {
        SocialPost {
            id: id.into(),
            account_id: "acc1".into(),
            platform: "linkedin".into(),
            content: "hello".into(),
            status,
            scheduled_at,
            published_at: None,
            provider_post_id: None,
            provider_url: None,
            last_error_code: None,
            last_error_message: None,
            retry_count: 0,
        }
    }

    async fn service() -> (Arc<MemoryStore>, Arc<QueueService>, Arc<JobQueue>) {
        let store = MemoryStore::new();
        let email = JobQueue::new("emails", &fast_config(), RetentionConfig::default(), None)
            .unwrap();
        let social = JobQueue::new(
            "social-posts",
            &fast_config(),
            RetentionConfig::default(),
            None,
        )
        .unwrap();
        let service = QueueService::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            email,
            Arc::clone(&social),
        );
        (store, service, social)
    }

    #[tokio::test]
    async fn test_queue_email_and_bulk() {
        let (_, service, _) = service().await;
        let id = service
            .queue_email(EmailJobData {
                to: "a@b.com".into(),
                subject: Some("Hi".into()),
                body: Some("Hello".into()),
                campaign_id: None,
                lead_id: None,
            })
            .await
            .unwrap();
        assert!(!id.is_empty());

        let ids = service
            .queue_bulk_emails(vec![
                EmailJobData {
                    to: "x@b.com".into(),
                    subject: None,
                    body: None,
                    campaign_id: Some("c1".into()),
                    lead_id: None,
                },
                EmailJobData {
                    to: "y@b.com".into(),
                    subject: None,
                    body: None,
                    campaign_id: Some("c1".into()),
                    lead_id: None,
                },
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(service.email_stats().await.waiting, 3);
    }

    #[tokio::test]
    async fn test_queue_draft_post_moves_to_scheduled() {
        let (store, service, social) = service().await;
        store.insert_post(post("p1", PostStatus::Draft, None)).await;

        let id = service.queue_social_post("p1").await.unwrap();
        assert_eq!(store.post("p1").await.unwrap().unwrap().status, PostStatus::Scheduled);
        assert_eq!(social.job(&id).await.unwrap().state, JobState::Waiting);
    }

    #[tokio::test]
    async fn test_future_post_gets_delayed_job() {
        let (store, service, social) = service().await;
        store
            .insert_post(post(
                "p1",
                PostStatus::Scheduled,
                Some(Utc::now() + chrono::Duration::hours(2)),
            ))
            .await;

        let id = service.queue_social_post("p1").await.unwrap();
        assert_eq!(social.job(&id).await.unwrap().state, JobState::Delayed);
    }

    #[tokio::test]
    async fn test_queue_post_is_deduped() {
        let (store, service, _) = service().await;
        store.insert_post(post("p1", PostStatus::Draft, None)).await;

        let first = service.queue_social_post("p1").await.unwrap();
        let second = service.queue_social_post("p1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.social_stats().await.waiting, 1);
    }

    #[tokio::test]
    async fn test_published_post_not_queueable() {
        let (store, service, _) = service().await;
        store
            .insert_post(post("p1", PostStatus::Published, None))
            .await;
        let err = service.queue_social_post("p1").await.unwrap_err();
        assert!(matches!(err, LeadflowError::Queue(_)));
    }

    #[tokio::test]
    async fn test_cancel_true_then_false() {
        let (store, service, _) = service().await;
        store
            .insert_post(post(
                "p1",
                PostStatus::Scheduled,
                Some(Utc::now() + chrono::Duration::hours(1)),
            ))
            .await;
        service.queue_social_post("p1").await.unwrap();

        assert!(service.cancel_social_post("p1").await.unwrap());
        assert_eq!(store.post("p1").await.unwrap().unwrap().status, PostStatus::Draft);
        assert!(!service.cancel_social_post("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_job_and_updates_record() {
        let (store, service, social) = service().await;
        store
            .insert_post(post(
                "p1",
                PostStatus::Scheduled,
                Some(Utc::now() + chrono::Duration::hours(1)),
            ))
            .await;
        let old_id = service.queue_social_post("p1").await.unwrap();

        let new_time = Utc::now() + chrono::Duration::hours(6);
        let new_id = service
            .reschedule_social_post("p1", new_time)
            .await
            .unwrap();

        assert_ne!(old_id, new_id);
        assert!(social.job(&old_id).await.is_none());
        let updated = store.post("p1").await.unwrap().unwrap();
        assert_eq!(updated.scheduled_at, Some(new_time));
        let job = social.job(&new_id).await.unwrap();
        assert_eq!(job.state, JobState::Delayed);
        assert!(job.run_at > Utc::now() + chrono::Duration::hours(5));
    }

    #[tokio::test]
    async fn test_queue_bulk_social_posts() {
        let (store, service, _) = service().await;
        store.insert_post(post("p1", PostStatus::Draft, None)).await;
        store.insert_post(post("p2", PostStatus::Draft, None)).await;

        let ids = service
            .queue_bulk_social_posts(&["p1".into(), "p2".into()])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        let stats = service.social_stats().await;
        assert_eq!(stats.waiting, 2);
        assert_eq!(stats.total(), 2);
    }

    #[tokio::test]
    async fn test_queue_pending_posts() {
        let (store, service, _) = service().await;
        store.insert_post(post("p1", PostStatus::Draft, None)).await;
        store
            .insert_post(post(
                "p2",
                PostStatus::Scheduled,
                Some(Utc::now() + chrono::Duration::hours(1)),
            ))
            .await;
        store
            .insert_post(post("p3", PostStatus::Published, None))
            .await;

        let ids = service.queue_pending_posts().await.unwrap();
        assert_eq!(ids.len(), 2);

        // Safe to run again thanks to dedup
        let again = service.queue_pending_posts().await.unwrap();
        assert_eq!(again.len(), 2);
        let stats = service.social_stats().await;
        assert_eq!(stats.waiting + stats.delayed, 2);
    }
}
