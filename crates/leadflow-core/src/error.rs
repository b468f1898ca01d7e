//! Leadflow error types.

use thiserror::Error;

/// Errors produced by the automation core.
#[derive(Debug, Error)]
pub enum LeadflowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Auth failed: {0}")]
    AuthFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across all Leadflow crates.
pub type Result<T> = std::result::Result<T, LeadflowError>;
