//! Social job processor: loads the post and its account, refreshes an
//! expired OAuth token, publishes, and writes bookkeeping back onto the
//! post record.
//!
//! Bookkeeping is written on every attempt, success or failure, so the
//! post record tells the full story even after the queue gives up.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use leadflow_core::{
    LeadflowError, PostStatus, RecordStore, Result, SocialPublisher, TokenStore,
    require_account, require_post,
};

use crate::job::Job;
use crate::worker::JobProcessor;

/// Turns queued social jobs (keyed by post id) into provider publishes.
pub struct SocialProcessor {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn SocialPublisher>,
    tokens: Arc<dyn TokenStore>,
}

impl SocialProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn SocialPublisher>,
        tokens: Arc<dyn TokenStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            publisher,
            tokens,
        })
    }

    /// Record a failed attempt on the post itself. The caller surfaces the
    /// attempt's own error so the queue schedules its retry; a bookkeeping
    /// failure here (say the post was deleted between attempts) is logged
    /// and must not replace it.
    async fn record_failure(&self, post_id: &str, error: &LeadflowError) {
        let result = async {
            let mut post = require_post(self.store.as_ref(), post_id).await?;
            post.last_error_code = Some(error_code(error).to_string());
            post.last_error_message = Some(error.to_string());
            post.retry_count += 1;
            self.store.update_post(post).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(
                "🔔 Failure bookkeeping for post {} failed: {}",
                post_id,
                e
            );
        }
    }
}

#[async_trait]
impl JobProcessor for SocialProcessor {
    async fn process(&self, job: &Job) -> Result<()> {
        let post_id = &job.key;
        let post = require_post(self.store.as_ref(), post_id).await?;

        // Already published or manually failed: nothing to do
        if !post.is_publishable() {
            tracing::info!(
                "🔔 Post {} is {:?}, skipping publish",
                post_id,
                post.status
            );
            return Ok(());
        }

        let mut account = require_account(self.store.as_ref(), &post.account_id).await?;
        if account.token_expired() {
            tracing::info!(
                "🔔 Token for account {} expired, refreshing",
                account.id
            );
            match self.tokens.refresh(&account).await {
                Ok(refreshed) => {
                    self.store.update_account(refreshed.clone()).await?;
                    account = refreshed;
                }
                Err(e) => {
                    let err = LeadflowError::AuthFailed(format!(
                        "token refresh for account {}: {e}",
                        account.id
                    ));
                    self.record_failure(post_id, &err).await;
                    return Err(err);
                }
            }
        }

        match self.publisher.publish(&post, &account).await {
            Ok(receipt) => {
                let mut post = require_post(self.store.as_ref(), post_id).await?;
                post.status = PostStatus::Published;
                post.published_at = Some(Utc::now());
                post.provider_post_id = Some(receipt.provider_id.clone());
                post.provider_url = receipt.url;
                post.last_error_code = None;
                post.last_error_message = None;
                self.store.update_post(post).await?;
                tracing::info!(
                    "✅ Post {} published (provider id {})",
                    post_id,
                    receipt.provider_id
                );
                Ok(())
            }
            Err(e) => {
                self.record_failure(post_id, &e).await;
                Err(e)
            }
        }
    }
}

fn error_code(error: &LeadflowError) -> &'static str {
    match error {
        LeadflowError::AuthFailed(_) => "auth_failed",
        LeadflowError::Provider(_) => "provider_error",
        LeadflowError::NotFound(_) => "not_found",
        _ => "internal",
    }
}
