use crate::domain::error::DomainError;
use crate::domain::models::GoalId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("goal {0} not found")]
    GoalNotFound(GoalId),
    #[error("activity backend error: {0}")]
    ActivityBackend(String),
}
