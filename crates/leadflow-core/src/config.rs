//! Leadflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadflowConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default = "QueueConfig::email_defaults")]
    pub email_queue: QueueConfig,
    #[serde(default = "QueueConfig::social_defaults")]
    pub social_queue: QueueConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for LeadflowConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            email_queue: QueueConfig::email_defaults(),
            social_queue: QueueConfig::social_defaults(),
            retention: RetentionConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl LeadflowConfig {
    /// Load config from the default path (~/.leadflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::LeadflowError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::LeadflowError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::LeadflowError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Leadflow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leadflow")
    }
}

/// Cron scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often each schedule loop re-checks its cron expression, in seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_check_interval() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Per-queue retry and worker limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum delivery attempts per job.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Base backoff delay in milliseconds (doubled per failed attempt).
    pub backoff_base_ms: u64,
    /// Simultaneous in-flight jobs per worker pool.
    pub concurrency: usize,
    /// Maximum job starts per one-second window.
    pub rate_limit_per_sec: u32,
}

fn default_attempts() -> u32 {
    3
}

impl QueueConfig {
    /// Email queue defaults: 3 attempts, ~2s base backoff, 5 workers, 10/s.
    pub fn email_defaults() -> Self {
        Self {
            attempts: 3,
            backoff_base_ms: 2_000,
            concurrency: 5,
            rate_limit_per_sec: 10,
        }
    }

    /// Social queue defaults: 3 attempts, ~5s base backoff, 3 workers, 5/s.
    pub fn social_defaults() -> Self {
        Self {
            attempts: 3,
            backoff_base_ms: 5_000,
            concurrency: 3,
            rate_limit_per_sec: 5,
        }
    }
}

/// Terminal-job retention: completed and failed jobs are kept for
/// inspection, bounded by count and age, then purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_completed_keep")]
    pub completed_keep: usize,
    #[serde(default = "default_completed_age")]
    pub completed_max_age_secs: u64,
    #[serde(default = "default_failed_keep")]
    pub failed_keep: usize,
    #[serde(default = "default_failed_age")]
    pub failed_max_age_secs: u64,
}

fn default_completed_keep() -> usize {
    100
}
fn default_completed_age() -> u64 {
    24 * 3600
}
fn default_failed_keep() -> usize {
    500
}
fn default_failed_age() -> u64 {
    7 * 24 * 3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_keep: default_completed_keep(),
            completed_max_age_secs: default_completed_age(),
            failed_keep: default_failed_keep(),
            failed_max_age_secs: default_failed_age(),
        }
    }
}

/// SMTP transport configuration for the lettre-backed email sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default)]
    pub from_email: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_name() -> String {
    "Leadflow".into()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_name: default_from_name(),
            from_email: String::new(),
        }
    }
}
