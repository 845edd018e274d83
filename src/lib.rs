#![deny(missing_docs)]

//! A fixed-size worker pool with a result channel.
//!
//! Tasks submitted to a [`WorkerPool`] run on a fixed set of worker
//! threads. Each task's value, or the reason it failed, comes back as a
//! [`Completion`] on the pool's result channel. Shutdown stops new
//! submissions and lets queued work drain.

mod config;
mod error;
mod task;
/// Thread pool implementations.
pub mod thread_pool;

pub use config::{FullPolicy, PoolConfig, QueueMode, DEFAULT_THREAD_NAME};
pub use error::{PoolError, Result, TaskError};
pub use task::{Completion, TaskId};
pub use thread_pool::{
    PoolBuilder, PoolState, PoolStats, RayonThreadPool, ResultReceiver, ThreadPool, WorkerPool,
};
