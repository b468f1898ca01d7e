//! # Leadflow Core
//!
//! Shared foundations for the Leadflow automation core:
//! - Domain records (leads, campaigns, social posts, accounts)
//! - Configuration loading (`~/.leadflow/config.toml`)
//! - The `LeadflowError` type used across all crates
//! - Collaborator traits — the seams to the persistence layer and the
//!   email/social providers. The core never talks to a provider SDK
//!   directly; it consumes these traits.

pub mod config;
pub mod error;
pub mod records;
pub mod traits;

pub use config::{
    LeadflowConfig, QueueConfig, RetentionConfig, SchedulerConfig, SmtpConfig,
};
pub use error::{LeadflowError, Result};
pub use records::{
    Campaign, EmailMessage, Grade, Lead, LeadStatus, PostStatus, ProviderReceipt, ScoringEvent,
    SocialAccount, SocialPost,
};
pub use traits::{
    EmailSender, MemoryStore, RecordStore, SocialPublisher, TokenStore, require_account,
    require_campaign, require_post,
};
