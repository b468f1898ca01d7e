//! Domain records shared across the automation core.
//!
//! These are the rows the core reads and writes through [`crate::traits::RecordStore`].
//! Creation and deletion of leads/campaigns is a collaborator concern; the
//! core only mutates them (scoring, status transitions, publish bookkeeping).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lead grade, derived from the score via fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// ≥80 A, ≥60 B, ≥40 C, ≥20 D, else F.
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 80 => Grade::A,
            s if s >= 60 => Grade::B,
            s if s >= 40 => Grade::C,
            s if s >= 20 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grade::A => write!(f, "A"),
            Grade::B => write!(f, "B"),
            Grade::C => write!(f, "C"),
            Grade::D => write!(f, "D"),
            Grade::F => write!(f, "F"),
        }
    }
}

/// Pipeline stage of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Customer,
    Unsubscribed,
}

/// One applied scoring rule, kept in the lead's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub timestamp: DateTime<Utc>,
    pub rule_id: String,
    pub points: i32,
    pub previous_score: i32,
    pub new_score: i32,
    pub reason: String,
}

/// A lead record. Score stays in [0,100]; grade always matches the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub job_title: String,
    /// Freeform bucket: "small", "mid", "enterprise".
    #[serde(default)]
    pub company_size: String,
    pub status: LeadStatus,
    pub score: i32,
    pub grade: Grade,
    pub last_engaged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scoring_history: Vec<ScoringEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a lead at intake with the base score of 50.
    pub fn new(id: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            email: email.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            company: String::new(),
            job_title: String::new(),
            company_size: String::new(),
            status: LeadStatus::New,
            score: 50,
            grade: Grade::from_score(50),
            last_engaged_at: None,
            scoring_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// An email campaign: the template a queued email job resolves against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub from_name: String,
    pub from_email: String,
}

/// Social post lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

/// A social post record. Publish bookkeeping (provider id/URL, error
/// code/message, retry count) is written by the social worker and survives
/// even after the queue exhausts its attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: String,
    pub account_id: String,
    pub platform: String,
    pub content: String,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub provider_post_id: Option<String>,
    pub provider_url: Option<String>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl SocialPost {
    /// Whether a worker may publish this post. Anything already published
    /// or manually failed is skipped as a no-op.
    pub fn is_publishable(&self) -> bool {
        matches!(self.status, PostStatus::Draft | PostStatus::Scheduled)
    }
}

/// A linked social account with its OAuth credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: String,
    pub platform: String,
    pub handle: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl SocialAccount {
    /// True when the access token needs a refresh round-trip before use.
    pub fn token_expired(&self) -> bool {
        match self.token_expires_at {
            Some(at) => at <= Utc::now(),
            None => false,
        }
    }
}

/// A fully-resolved outbound email, ready for the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub from_name: String,
    pub from_email: String,
    pub campaign_id: Option<String>,
}

/// Success metadata returned by a provider (email or social).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReceipt {
    pub provider_id: String,
    pub url: Option<String>,
}
