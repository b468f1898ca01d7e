//! Collaborator traits — the seams between the automation core and the
//! outside world (persistence, email provider, social provider SDKs).
//!
//! The core consumes these as opaque capabilities; real implementations
//! live with the API layer. `MemoryStore` here backs tests and the demo
//! binary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{LeadflowError, Result};
use crate::records::{
    Campaign, EmailMessage, Lead, PostStatus, ProviderReceipt, SocialAccount, SocialPost,
};

/// Generic record store with read/update for the records the core touches.
///
/// Updates are plain read-modify-write: there is no optimistic-concurrency
/// token, so a retried job racing a manual edit can lose updates. Known
/// risk, accepted as-is.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn campaign(&self, id: &str) -> Result<Option<Campaign>>;
    async fn lead(&self, id: &str) -> Result<Option<Lead>>;
    async fn update_lead(&self, lead: Lead) -> Result<()>;
    async fn post(&self, id: &str) -> Result<Option<SocialPost>>;
    async fn update_post(&self, post: SocialPost) -> Result<()>;
    async fn account(&self, id: &str) -> Result<Option<SocialAccount>>;
    async fn update_account(&self, account: SocialAccount) -> Result<()>;
    /// All posts still waiting to publish (draft or scheduled).
    async fn scheduled_posts(&self) -> Result<Vec<SocialPost>>;
}

/// Opaque "send one email" capability.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<ProviderReceipt>;
}

/// Opaque "publish one post" capability.
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    async fn publish(&self, post: &SocialPost, account: &SocialAccount)
    -> Result<ProviderReceipt>;
}

/// OAuth token store: exchanges a refresh token for fresh credentials.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn refresh(&self, account: &SocialAccount) -> Result<SocialAccount>;
}

/// In-memory record store for tests and the demo binary.
#[derive(Default)]
pub struct MemoryStore {
    leads: RwLock<HashMap<String, Lead>>,
    campaigns: RwLock<HashMap<String, Campaign>>,
    posts: RwLock<HashMap<String, SocialPost>>,
    accounts: RwLock<HashMap<String, SocialAccount>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert_lead(&self, lead: Lead) {
        self.leads.write().await.insert(lead.id.clone(), lead);
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns
            .write()
            .await
            .insert(campaign.id.clone(), campaign);
    }

    pub async fn insert_post(&self, post: SocialPost) {
        self.posts.write().await.insert(post.id.clone(), post);
    }

    pub async fn insert_account(&self, account: SocialAccount) {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
    }

    pub async fn remove_post(&self, id: &str) {
        self.posts.write().await.remove(id);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn campaign(&self, id: &str) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(id).cloned())
    }

    async fn lead(&self, id: &str) -> Result<Option<Lead>> {
        Ok(self.leads.read().await.get(id).cloned())
    }

    async fn update_lead(&self, lead: Lead) -> Result<()> {
        self.leads.write().await.insert(lead.id.clone(), lead);
        Ok(())
    }

    async fn post(&self, id: &str) -> Result<Option<SocialPost>> {
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn update_post(&self, post: SocialPost) -> Result<()> {
        self.posts.write().await.insert(post.id.clone(), post);
        Ok(())
    }

    async fn account(&self, id: &str) -> Result<Option<SocialAccount>> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn update_account(&self, account: SocialAccount) -> Result<()> {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
        Ok(())
    }

    async fn scheduled_posts(&self) -> Result<Vec<SocialPost>> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| matches!(p.status, PostStatus::Draft | PostStatus::Scheduled))
            .cloned()
            .collect())
    }
}

/// Look up a record or fail with `NotFound` — the common worker pattern.
pub async fn require_post(store: &dyn RecordStore, id: &str) -> Result<SocialPost> {
    store
        .post(id)
        .await?
        .ok_or_else(|| LeadflowError::NotFound(format!("post {id}")))
}

/// See [`require_post`].
pub async fn require_campaign(store: &dyn RecordStore, id: &str) -> Result<Campaign> {
    store
        .campaign(id)
        .await?
        .ok_or_else(|| LeadflowError::NotFound(format!("campaign {id}")))
}

/// See [`require_post`].
pub async fn require_account(store: &dyn RecordStore, id: &str) -> Result<SocialAccount> {
    store
        .account(id)
        .await?
        .ok_or_else(|| LeadflowError::NotFound(format!("account {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.insert_lead(Lead::new("l1", "a@b.com")).await;

        let lead = store.lead("l1").await.unwrap().unwrap();
        assert_eq!(lead.email, "a@b.com");
        assert!(store.lead("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_require_helpers() {
        let store = MemoryStore::new();
        let err = require_campaign(store.as_ref(), "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::NotFound(_)));
    }
}
