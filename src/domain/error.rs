use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("unknown goal type: {0}")]
    UnknownGoalType(String),
    #[error("invalid period: {0}")]
    InvalidPeriod(String),
    #[error("invalid goal: {0}")]
    InvalidGoal(String),
    #[error("category path not found: {0}")]
    PathNotFound(String),
}
