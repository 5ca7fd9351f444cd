//! Error types for the resource pool

use thiserror::Error;

/// Boxed error produced by openers and by handle `close` implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("opener failed: {0}")]
    Opener(BoxError),

    #[error("timed out waiting for a pooled resource")]
    AcquireTimeout,

    #[error("pool is shut down")]
    PoolClosed,

    #[error("resource was not acquired from this pool")]
    ForeignResource,

    #[error("resource close failed: {0}")]
    CloseFailed(BoxError),

    #[error("duplicate return: opened ({opened}) would drop below idle ({idle})")]
    Inconsistency { opened: usize, idle: usize },
}

pub type PoolResult<T> = Result<T, PoolError>;
