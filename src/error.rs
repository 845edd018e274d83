use std::io;
use std::sync::PoisonError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A pool must have at least one worker.
    #[error("thread pool size must be at least 1")]
    InvalidSize,

    /// Submission attempted after shutdown began.
    #[error("pool is closed to new submissions")]
    PoolClosed,

    /// The bounded job queue is full and the pool rejects on full.
    #[error("job queue is full")]
    QueueFull,

    /// An internal lock was poisoned by a panicking thread.
    #[error("pool state lock poisoned")]
    Poisoned,

    /// IO error, e.g. from spawning a worker thread.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error.
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The rayon backend could not be built.
    #[error("Rayon error: {0}")]
    Rayon(#[from] rayon::ThreadPoolBuildError),
}

impl<T> From<PoisonError<T>> for PoolError {
    fn from(_: PoisonError<T>) -> Self {
        PoolError::Poisoned
    }
}

/// Failure of a single task, delivered on the result channel.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskError {
    /// The task panicked; holds the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task returned an error.
    #[error("task failed: {0}")]
    Failed(String),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
