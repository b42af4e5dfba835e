/// Error types for leaderboard-service
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the sorted-set ranking store
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Entrant {0} is not in the sorted set")]
    NotFound(Uuid),

    #[error("Sorted-set backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Sorted-set call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid cache data: {0}")]
    InvalidData(String),
}

impl CacheError {
    /// Whether the failure means the cache cannot answer right now.
    /// Every such failure is absorbed by falling back to the relational store.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, CacheError::NotFound(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Failures of the relational (durable) ranking store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced to callers of the ranking operations
#[derive(Error, Debug)]
pub enum RankingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tenant {0} is not allowed to use cache ranking")]
    CacheNotPermitted(Uuid),

    #[error("Sorted-set cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Relational store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RankingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => RankingError::NotFound(what),
            other => RankingError::Store(other),
        }
    }
}

pub type RankingResult<T> = Result<T, RankingError>;
