#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invocation {0} not found")]
    NotFound(uuid::Uuid),
    #[error("invocation {0} is already terminal")]
    AlreadyTerminal(uuid::Uuid),
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: crate::invocation::InvocationStatus, to: crate::invocation::InvocationStatus },
    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("status_percent must be in 0..=100, got {0}")]
    StatusPercentOutOfRange(i32),
}

pub type Result<T> = std::result::Result<T, Error>;
